use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::ConfigurationError;

/// Fields managed by the data layer; never accepted from API input
pub const SYSTEM_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Value type of a field, used to read typed values out of query strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
}

/// The closed set of resource collections exposed by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Customers,
    Technicians,
    WorkOrders,
    Invoices,
    Contracts,
    Inventory,
    Users,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::Customers,
        ResourceType::Technicians,
        ResourceType::WorkOrders,
        ResourceType::Invoices,
        ResourceType::Contracts,
        ResourceType::Inventory,
        ResourceType::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Customers => "customers",
            ResourceType::Technicians => "technicians",
            ResourceType::WorkOrders => "work_orders",
            ResourceType::Invoices => "invoices",
            ResourceType::Contracts => "contracts",
            ResourceType::Inventory => "inventory",
            ResourceType::Users => "users",
        }
    }

    /// Physical table backing the collection
    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }

    /// Label used in write-response messages
    pub fn singular(&self) -> &'static str {
        match self {
            ResourceType::Customers => "Customer",
            ResourceType::Technicians => "Technician",
            ResourceType::WorkOrders => "Work order",
            ResourceType::Invoices => "Invoice",
            ResourceType::Contracts => "Contract",
            ResourceType::Inventory => "Inventory item",
            ResourceType::Users => "User",
        }
    }

    /// Every field a record of this type may carry, system fields included
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            ResourceType::Customers => &[
                "id", "name", "email", "phone", "address", "city", "status",
                "account_manager_id", "created_at", "updated_at",
            ],
            ResourceType::Technicians => &[
                "id", "user_id", "name", "email", "phone", "skills", "status",
                "hourly_rate", "created_at", "updated_at",
            ],
            ResourceType::WorkOrders => &[
                "id", "customer_id", "assigned_technician_id", "title", "description",
                "status", "priority", "scheduled_date", "completed_date",
                "created_at", "updated_at",
            ],
            ResourceType::Invoices => &[
                "id", "customer_id", "work_order_id", "invoice_number", "amount",
                "status", "due_date", "paid_date", "created_at", "updated_at",
            ],
            ResourceType::Contracts => &[
                "id", "customer_id", "contract_number", "title", "start_date",
                "end_date", "value", "status", "created_at", "updated_at",
            ],
            ResourceType::Inventory => &[
                "id", "sku", "name", "description", "category", "quantity",
                "unit_price", "location", "reorder_level", "created_at", "updated_at",
            ],
            ResourceType::Users => &[
                "id", "username", "email", "role", "is_active", "last_login",
                "created_at", "updated_at",
            ],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    pub fn field_kind(&self, field: &str) -> FieldKind {
        match (self, field) {
            (ResourceType::WorkOrders, "priority")
            | (ResourceType::Invoices, "amount")
            | (ResourceType::Technicians, "hourly_rate")
            | (ResourceType::Contracts, "value")
            | (ResourceType::Inventory, "quantity" | "unit_price" | "reorder_level") => FieldKind::Number,
            (ResourceType::Users, "is_active") => FieldKind::Boolean,
            _ => FieldKind::Text,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownResource(s.to_string()))
    }
}
