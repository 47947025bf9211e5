//! GAIA - an AI analyst for the company data warehouse.

use chrono::Local;
use tracing::{error, info, warn};

use gaia_analyst::catalog::SchemaCatalog;
use gaia_analyst::cli::Cli;
use gaia_analyst::config::{Config, WarehouseConfig};
use gaia_analyst::error::{AnalystError, Result};
use gaia_analyst::examples::ExampleStore;
use gaia_analyst::exec::WarehouseClient;
use gaia_analyst::export;
use gaia_analyst::llm::{OpenAiClient, OpenAiConfig};
use gaia_analyst::rules::BusinessRuleSet;
use gaia_analyst::session::AnalystSession;
use gaia_analyst::{logging, templates::TemplateLibrary};

#[tokio::main]
async fn main() {
    // .env is a convenience for local runs; absence is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    };

    logging::init(config.production_mode);

    if let Err(e) = run(cli, config).await {
        error!("{}: {}", e.category(), e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut config: Config) -> Result<()> {
    if let Some(url) = &cli.warehouse_url {
        config.warehouse = WarehouseConfig::from_connection_string(url)?;
    }

    let today = Local::now().date_naive();
    let mut session = AnalystSession::new(
        SchemaCatalog::load()?,
        BusinessRuleSet::load()?,
        ExampleStore::load()?,
        config.limits,
        today,
    )?;

    if config.llm.is_configured() {
        let api_key = config.llm.api_key.clone().unwrap_or_default();
        let llm_config =
            OpenAiConfig::new(api_key, config.llm.model.clone()).with_timeout(config.llm.timeout_secs);
        session = session.with_model(Box::new(OpenAiClient::new(llm_config)?));
        info!("Language model configured ({})", config.llm.model);
    } else {
        warn!("No model API key; falling back to the template library");
    }

    if config.warehouse.is_configured() {
        match WarehouseClient::connect(&config.warehouse).await {
            Ok(client) => {
                info!("Warehouse connected ({})", config.warehouse.display_string());
                session = session.with_warehouse(Box::new(client));
            }
            Err(e) if e.is_downgrade() => {
                warn!("Warehouse unreachable, continuing with demo data: {e}");
            }
            Err(e) => return Err(e),
        }
    } else {
        warn!("Warehouse credentials incomplete; continuing with demo data");
    }

    let Some(question) = &cli.question else {
        print_status(&session, &config);
        return Ok(());
    };

    let answer = session.ask(question).await?;

    println!("mode: {}  source: {}", answer.query.mode, answer.result.source);
    if cli.show_sql {
        println!("\n{}\n", answer.query.validated_sql);
    }
    for warning in &answer.query.warnings {
        println!("note: {warning}");
    }

    print!("{}", export::render_table(&answer.result));
    println!(
        "({} rows{})",
        answer.result.row_count,
        if answer.result.truncated { ", truncated" } else { "" }
    );

    if let Some(path) = &cli.csv {
        let file = std::fs::File::create(path)
            .map_err(|e| AnalystError::internal(format!("cannot create {}: {e}", path.display())))?;
        export::write_csv(&answer.result, file)?;
        println!("wrote {}", path.display());
    }

    Ok(())
}

fn print_status(session: &AnalystSession, config: &Config) {
    println!("GAIA warehouse analyst");
    println!("mode: {}", session.mode());
    println!(
        "model: {}",
        if config.llm.is_configured() { config.llm.model.as_str() } else { "not configured" }
    );
    println!("warehouse: {}", config.warehouse.display_string());
    println!("templates: {}", TemplateLibrary::new().names().join(", "));
    println!("\nUsage: gaia \"<question>\" [--show-sql] [--csv out.csv]");
}
