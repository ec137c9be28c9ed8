use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use agri_seal::crypto::generate_key;
use agri_seal::infra::{
    AppEnvironment, AuditAction, AuditQueryFilters, KeyCustody, MasterKey, PgAuditLogger,
    PgSealRepository, PgShipmentDirectory,
};
use agri_seal::service::SealService;

fn print_help() {
    eprintln!(
        "\
agri-seal-admin

USAGE:
  agri-seal-admin <command> [options]

COMMANDS:
  migrate                         Run database migrations
  generate-master-key             Print a fresh 32-byte master key (hex)
  provision                       Provision a seal and print its public key
  expire-sweep                    Expire every seal past its expiry time
  stats                           Seal counts by status
  audit-log                       Print recent audit entries as NDJSON

COMMON OPTIONS:
  --database-url <postgres_url>    (defaults to env DATABASE_URL)

provision OPTIONS:
  --serial <serial_number>        (required) e.g. SEAL-0001
  --expires-at <rfc3339>          (optional)

audit-log OPTIONS:
  --actor <name>                  (optional)
  --action <action>               (optional) e.g. seal_tamper_detected
  --seal-id <uuid>                (optional)
  --since <rfc3339>               (optional)
  --failures-only                 (optional)
  --limit <n>                     (default: 100)

ENV:
  APP_ENV, SEAL_MASTER_KEY (required when APP_ENV=production)
"
    );
}

fn require_database_url(database_url: Option<String>) -> anyhow::Result<String> {
    database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (or pass --database-url)"))
}

fn take_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

fn parse_timestamp(flag: &str, raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| anyhow::anyhow!("invalid {flag} {raw:?}: {e}"))
}

async fn connect(database_url: Option<String>) -> anyhow::Result<PgPool> {
    let database_url = require_database_url(database_url)?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    agri_seal::migrations::run_postgres(&pool).await?;
    Ok(pool)
}

fn seal_service(pool: &PgPool) -> anyhow::Result<SealService> {
    let master_key = MasterKey::from_env(AppEnvironment::from_env()?)?;
    Ok(SealService::new(
        Arc::new(PgSealRepository::new(pool.clone())),
        Arc::new(PgShipmentDirectory::new(pool.clone())),
        Arc::new(PgAuditLogger::new(pool.clone())),
        KeyCustody::new(master_key),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "generate-master-key" => {
            if let Some(other) = args.pop_front() {
                anyhow::bail!("unexpected argument: {other}");
            }
            println!("{}", hex::encode(generate_key()));
            Ok(())
        }
        "migrate" | "expire-sweep" | "stats" => {
            let mut database_url: Option<String> = None;
            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let pool = connect(database_url).await?;
            match command.as_str() {
                "migrate" => println!("ok: migrations applied"),
                "expire-sweep" => {
                    let expired = seal_service(&pool)?.process_expired_seals().await?;
                    println!("ok: {expired} seal(s) expired");
                }
                _ => {
                    let stats = seal_service(&pool)?.get_seal_stats().await?;
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
            }
            Ok(())
        }
        "provision" => {
            let mut database_url: Option<String> = None;
            let mut serial: Option<String> = None;
            let mut expires_at: Option<DateTime<Utc>> = None;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "--serial" => serial = Some(take_value(&mut args, &arg)?),
                    "--expires-at" => {
                        let raw = take_value(&mut args, &arg)?;
                        expires_at = Some(parse_timestamp(&arg, &raw)?);
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let serial = serial.ok_or_else(|| anyhow::anyhow!("--serial is required"))?;
            let pool = connect(database_url).await?;
            let provisioned = seal_service(&pool)?
                .provision_seal(&serial, expires_at)
                .await?;
            println!("{}", serde_json::to_string_pretty(&provisioned)?);
            Ok(())
        }
        "audit-log" => {
            let mut database_url: Option<String> = None;
            let mut filters = AuditQueryFilters::default();
            let mut limit: i64 = 100;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--database-url" => database_url = Some(take_value(&mut args, &arg)?),
                    "--actor" => filters.actor = Some(take_value(&mut args, &arg)?),
                    "--action" => {
                        let raw = take_value(&mut args, &arg)?;
                        let action: AuditAction = serde_json::from_value(serde_json::json!(raw))
                            .map_err(|_| anyhow::anyhow!("unknown audit action: {raw}"))?;
                        filters.action = Some(action);
                    }
                    "--seal-id" => {
                        let raw = take_value(&mut args, &arg)?;
                        filters.resource_id = Some(uuid::Uuid::parse_str(&raw)?.to_string());
                    }
                    "--since" => {
                        let raw = take_value(&mut args, &arg)?;
                        filters.from = Some(parse_timestamp(&arg, &raw)?);
                    }
                    "--failures-only" => filters.failures_only = Some(true),
                    "--limit" => limit = take_value(&mut args, &arg)?.parse()?,
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let pool = connect(database_url).await?;
            let logger = PgAuditLogger::new(pool);
            let total = logger.count().await?;
            for entry in logger.query(filters, limit.clamp(1, 10_000), 0).await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
            eprintln!("ok: {total} audit entries in total");
            Ok(())
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}")
        }
    }
}
