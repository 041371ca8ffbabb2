mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

use common::{ids, send, TestServer};

#[tokio::test]
async fn list_envelope_shape() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("1", "admin", "/api/data/customers")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"].is_array(), "data should be an array: {}", body);
    assert_eq!(body["count"], 3);
    assert_eq!(body["rlsApplied"], true);
    assert_eq!(body["appliedFilters"], json!({}));
    assert!(body["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')), "timestamp: {}", body);

    let pagination = &body["pagination"];
    assert_eq!(pagination["page"], 1);
    assert_eq!(pagination["total"], 3);
    assert_eq!(pagination["totalPages"], 1);
    assert_eq!(pagination["hasNextPage"], false);
    assert_eq!(pagination["hasPrevPage"], false);
    Ok(())
}

#[tokio::test]
async fn admin_sees_all_contracts() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("1", "admin", "/api/data/contracts")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["c-301", "c-302"]);
    assert_eq!(body["rlsApplied"], true);
    Ok(())
}

#[tokio::test]
async fn technician_without_contract_policy_gets_empty_list() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("7", "technician", "/api/data/contracts")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["rlsApplied"], true);
    assert_eq!(body["pagination"]["total"], 0);
    Ok(())
}

#[tokio::test]
async fn customer_lists_only_own_invoices() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("42", "customer", "/api/data/invoices")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["inv-5001", "inv-5002"]);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["rlsApplied"], true);
    Ok(())
}

#[tokio::test]
async fn customer_gets_own_invoice() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("42", "customer", "/api/data/invoices/inv-5001")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "inv-5001");
    assert_eq!(body["data"]["customer_id"], "42");
    assert_eq!(body["rlsApplied"], true);
    Ok(())
}

#[tokio::test]
async fn other_customers_invoice_is_indistinguishable_from_missing() -> Result<()> {
    let server = TestServer::start().await?;

    let (hidden_status, hidden) = send(server.get_as("42", "customer", "/api/data/invoices/inv-5003")).await?;
    let (missing_status, missing) = send(server.get_as("42", "customer", "/api/data/invoices/inv-0000")).await?;

    assert_eq!(hidden_status, StatusCode::NOT_FOUND);
    assert_eq!(missing_status, StatusCode::NOT_FOUND);
    assert_eq!(hidden["message"], "Invoice not found");
    assert_eq!(hidden["message"], missing["message"]);
    assert_eq!(hidden["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn technician_sees_assigned_work_orders() -> Result<()> {
    let server = TestServer::start().await?;

    let (_, body) = send(server.get_as("7", "technician", "/api/data/work_orders")).await?;
    assert_eq!(ids(&body), vec!["wo-1001", "wo-1003"]);

    let (status, _) = send(server.get_as("7", "technician", "/api/data/work_orders/wo-1002")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn technician_profile_is_own_row_only() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("7", "technician", "/api/data/technicians/7")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["skills"], json!(["hvac", "electrical"]));

    let (status, _) = send(server.get_as("7", "technician", "/api/data/technicians/8")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn public_inventory_is_not_marked_as_rls() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("3", "dispatcher", "/api/data/inventory")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["rlsApplied"], false);
    Ok(())
}

#[tokio::test]
async fn dispatcher_below_minimum_role_for_invoices_is_forbidden() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("3", "dispatcher", "/api/data/invoices")).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send(server.get_as("2", "manager", "/api/data/invoices")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    Ok(())
}

#[tokio::test]
async fn customer_profile_via_customers_and_users() -> Result<()> {
    let server = TestServer::start().await?;

    let (_, body) = send(server.get_as("99", "customer", "/api/data/customers")).await?;
    assert_eq!(ids(&body), vec!["99"]);

    let (_, body) = send(server.get_as("99", "customer", "/api/data/users")).await?;
    assert_eq!(ids(&body), vec!["99"]);
    Ok(())
}

#[tokio::test]
async fn unknown_resource_is_404() -> Result<()> {
    let server = TestServer::start().await?;

    let (status, body) = send(server.get_as("1", "admin", "/api/data/payroll")).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Unknown resource: payroll");
    Ok(())
}

#[tokio::test]
async fn repeated_reads_are_stable() -> Result<()> {
    let server = TestServer::start().await?;

    let (_, first) = send(server.get_as("42", "customer", "/api/data/work_orders")).await?;
    let (_, second) = send(server.get_as("42", "customer", "/api/data/work_orders")).await?;

    assert_eq!(ids(&first), vec!["wo-1001", "wo-1002"]);
    assert_eq!(first["data"], second["data"]);
    Ok(())
}
