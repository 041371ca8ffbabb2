use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::utils::{output_error, output_success, output_table};
use crate::cli::OutputFormat;
use crate::config::CONFIG;
use crate::database::Record;
use crate::rls::{evaluate, AccessDecision, Policy, PolicyRegistry, QueryConstraint, RequestContext, ResourceType};
use crate::types::Operation;

#[derive(Subcommand)]
pub enum PolicyCommands {
    #[command(about = "Load and validate a policy file")]
    Check {
        #[arg(help = "Policy file (YAML)")]
        path: PathBuf,
    },

    #[command(about = "Print the resolved policy table")]
    Show {
        #[arg(help = "Policy file (defaults to RLS_POLICY_FILE, then the built-in table)")]
        path: Option<PathBuf>,
    },

    #[command(about = "Evaluate a hypothetical request and print the decision")]
    Explain {
        #[arg(long, help = "Requester role")]
        role: String,
        #[arg(long, help = "Resource type, e.g. invoices")]
        resource: ResourceType,
        #[arg(long, help = "list, get, create, update or delete")]
        operation: Operation,
        #[arg(long, default_value = "", help = "Requester id")]
        requester: String,
        #[arg(long, help = "Target record as a JSON object")]
        record: Option<String>,
        #[arg(long, help = "Policy file (defaults to RLS_POLICY_FILE, then the built-in table)")]
        policies: Option<PathBuf>,
    },
}

pub async fn handle(cmd: PolicyCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PolicyCommands::Check { path } => check(path, output_format),
        PolicyCommands::Show { path } => show(path, output_format),
        PolicyCommands::Explain {
            role,
            resource,
            operation,
            requester,
            record,
            policies,
        } => {
            let registry = load(policies)?;
            let mut ctx = RequestContext::new(requester, role, resource, operation);
            if let Some(raw) = record {
                let value: Value = serde_json::from_str(&raw).context("--record is not valid JSON")?;
                ctx = ctx.with_record(Record::from_value(value)?);
            }
            explain(&registry, &ctx, output_format)
        }
    }
}

fn load(path: Option<PathBuf>) -> anyhow::Result<PolicyRegistry> {
    match path.or_else(|| CONFIG.rls.policy_file.clone()) {
        Some(path) => PolicyRegistry::from_path(&path)
            .with_context(|| format!("failed to load policies from {}", path.display())),
        None => Ok(PolicyRegistry::builtin()?),
    }
}

fn check(path: PathBuf, output_format: OutputFormat) -> anyhow::Result<()> {
    match PolicyRegistry::from_path(&path) {
        Ok(registry) => output_success(
            output_format,
            &format!("{}: {} policies valid", path.display(), registry.len()),
            Some(json!({ "path": path.display().to_string(), "policies": registry.len() })),
        ),
        Err(e) => {
            output_error(output_format, &e.to_string(), Some("CONFIGURATION_ERROR"))?;
            Err(anyhow::anyhow!("{} is not a valid policy file", path.display()))
        }
    }
}

fn show(path: Option<PathBuf>, output_format: OutputFormat) -> anyhow::Result<()> {
    let registry = load(path)?;
    let rows = registry.describe();

    match output_format {
        OutputFormat::Json => {
            let policies: Vec<Value> = rows
                .iter()
                .map(|(class, policy)| {
                    let mut row = json!(policy);
                    row["operations"] = json!(class);
                    row
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "policies": policies }))?);
        }
        OutputFormat::Text => {
            let table: Vec<Vec<String>> = rows
                .iter()
                .map(|(class, policy)| {
                    vec![
                        policy.role.clone(),
                        policy.resource.to_string(),
                        class.to_string(),
                        policy.kind.to_string(),
                        detail(policy),
                        policy.name.clone(),
                    ]
                })
                .collect();
            output_table(&["ROLE", "RESOURCE", "OPS", "KIND", "DETAIL", "NAME"], &table);
            println!("\n{} policies; anything not listed resolves to deny_all", rows.len());
        }
    }
    Ok(())
}

fn detail(policy: &Policy) -> String {
    match (&policy.owner_field, policy.minimum_role) {
        (Some(field), _) => format!("owner_field={}", field),
        (None, Some(role)) => format!("minimum_role={}", role),
        (None, None) => String::new(),
    }
}

fn explain(registry: &PolicyRegistry, ctx: &RequestContext, output_format: OutputFormat) -> anyhow::Result<()> {
    let policy = registry.resolve(&ctx.requester_role, ctx.resource, ctx.operation.class());
    let decision = evaluate(&policy, ctx);
    let constraint = QueryConstraint::from_decision(&decision).to_where();

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "policy": policy,
                    "decision": decision,
                    "constraint": constraint,
                }))?
            );
        }
        OutputFormat::Text => print_decision(&policy, ctx, &decision, constraint),
    }
    Ok(())
}

fn print_decision(policy: &Policy, ctx: &RequestContext, decision: &AccessDecision, constraint: Option<Value>) {
    println!(
        "{} on {} as {} '{}'{}",
        ctx.operation,
        ctx.resource,
        ctx.requester_role,
        ctx.requester_id,
        if ctx.target_record.is_some() { " with target record" } else { "" }
    );
    println!(
        "policy:   {} ({}{})",
        policy.name,
        policy.kind,
        if policy.explicit { "" } else { ", implicit default" }
    );
    println!("outcome:  {:?}", decision.outcome);
    if let Some(reason) = decision.reason {
        println!("reason:   {}", reason);
    }
    if let Some(where_clause) = constraint {
        println!("filter:   {}", where_clause);
    }
    println!("rls:      {}", decision.policy_applied);
}
