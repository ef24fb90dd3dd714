//! `dynds`: inspect and exercise datasource configuration from the terminal

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use dynds_config::{
    Bindable, DataSourceProperty, DynamicDataSourceProperties, loader, setter_index,
};
use dynds_creator::{FilterKind, PoolDataSourceCreator};
use dynds_pool::{PoolConfig, PoolDataSource};
use indexmap::IndexMap;
use strum::IntoEnumIterator;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dynds", version, about = "Configuration-bound connection pools")]
struct Cli {
    /// Log binding and pool activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open one connection and optionally run a validation query
    Validate {
        /// Connection URL, e.g. sqlite:/var/lib/app.db
        #[arg(long, required_unless_present = "datasource")]
        url: Option<String>,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, env = "DYNDS_PASSWORD", default_value = "", hide_env_values = true)]
        password: String,
        /// Statement executed on the probe connection
        #[arg(long)]
        sql: Option<String>,
        /// Probe a configured datasource instead of --url
        #[arg(long, conflicts_with = "url")]
        datasource: Option<String>,
        /// Configuration file; defaults to the user configuration directory
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Build every configured pool and show its effective settings
    Create {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Start every pool, not only the ones with `lazy = false`
        #[arg(long)]
        init: bool,
        /// Print settings as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the property names a configuration target accepts
    Properties {
        #[arg(value_enum, default_value_t = Target::Pool)]
        target: Target,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Pool,
    Stat,
    Wall,
    Log,
    /// Every target
    All,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "warn,dynds_config=debug,dynds_pool=debug,dynds_creator=debug,dynds_drivers=debug"
    } else {
        "warn,dynds_creator=info"
    };
    // RUST_LOG takes precedence over the default filter
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<DynamicDataSourceProperties> {
    let path = match path {
        Some(path) => path,
        None => loader::default_config_path()?,
    };
    DynamicDataSourceProperties::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Validate {
            url,
            username,
            password,
            sql,
            datasource,
            config,
        } => {
            let (url, username, password) = match datasource {
                Some(name) => {
                    let properties = load_config(config)?;
                    let property = resolve_datasource(&properties, &name)?;
                    (
                        property.url.clone(),
                        property.username.clone(),
                        property.password.clone(),
                    )
                }
                None => (url.unwrap_or_default(), username, password),
            };
            validate(&url, &username, &password, sql.as_deref()).await
        }
        Command::Create { config, init, json } => {
            let properties = load_config(config)?;
            create(&properties, init, json).await
        }
        Command::Properties { target } => {
            properties(target);
            Ok(())
        }
    }
}

/// Find a datasource by name; unknown names use the primary unless `strict`
fn resolve_datasource<'a>(
    properties: &'a DynamicDataSourceProperties,
    name: &str,
) -> anyhow::Result<&'a DataSourceProperty> {
    let Some(property) = properties.data_source(name) else {
        bail!("no datasource named '{}'", name);
    };
    if !properties.datasource.contains_key(name) {
        tracing::warn!(
            requested = name,
            primary = %properties.primary,
            "unknown datasource, using the primary"
        );
    }
    Ok(property)
}

async fn validate(url: &str, username: &str, password: &str, sql: Option<&str>) -> anyhow::Result<()> {
    tracing::debug!(url, with_sql = sql.is_some(), "probing connection");
    dynds_drivers::valid_with_sql(url, username, password, sql)
        .await
        .with_context(|| format!("connection check failed for {}", url))?;
    println!("OK  {}", url);
    Ok(())
}

async fn create(
    properties: &DynamicDataSourceProperties,
    init: bool,
    json: bool,
) -> anyhow::Result<()> {
    let creator = PoolDataSourceCreator::from_properties(properties);
    let pools = creator
        .create_all(properties)
        .await
        .context("failed to create datasources")?;

    if init {
        for (key, pool) in &pools {
            pool.init()
                .await
                .with_context(|| format!("failed to start datasource '{}'", key))?;
        }
    }

    if json {
        let settings: serde_json::Map<String, serde_json::Value> = pools
            .iter()
            .map(|(key, pool)| Ok((key.clone(), serde_json::to_value(pool.config())?)))
            .collect::<serde_json::Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        print_pools(properties, &pools);
    }

    for pool in pools.values() {
        pool.close().await;
    }
    Ok(())
}

fn print_pools(
    properties: &DynamicDataSourceProperties,
    pools: &IndexMap<String, Arc<PoolDataSource>>,
) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Datasource",
            "Pool",
            "URL",
            "Driver",
            "Max active",
            "Max wait",
            "Filters",
            "State",
        ]);

    for (key, pool) in pools {
        let config = pool.config();
        let name = if *key == properties.primary {
            format!("{} (primary)", key)
        } else {
            key.clone()
        };
        let max_wait = config
            .max_wait()
            .map_or_else(|| "forever".to_string(), |d| format!("{} ms", d.as_millis()));
        let state = if pool.is_initialized() {
            let stats = pool.stats();
            format!("{} idle / {} active", stats.idle(), stats.active())
        } else {
            "lazy".to_string()
        };

        table.add_row(vec![
            Cell::new(name),
            Cell::new(pool.name()),
            Cell::new(config.url()),
            Cell::new(config.driver_class_name().unwrap_or("(from url)")),
            Cell::new(config.max_active()),
            Cell::new(max_wait),
            Cell::new(pool.filters().names().join(", ")),
            Cell::new(state),
        ]);
    }

    println!("{table}");
}

fn names<T: Bindable>() -> Vec<&'static str> {
    let mut names: Vec<_> = setter_index::<T>().property_names().collect();
    names.sort_unstable();
    names
}

fn properties(target: Target) {
    let mut sections: Vec<(String, Vec<&'static str>)> = Vec::new();
    if matches!(target, Target::Pool | Target::All) {
        sections.push(("pool".to_string(), names::<PoolConfig>()));
    }
    for kind in FilterKind::iter() {
        let wanted = match target {
            Target::All => true,
            Target::Stat => kind == FilterKind::Stat,
            Target::Wall => kind == FilterKind::Wall,
            Target::Log => matches!(kind, FilterKind::Tracing | FilterKind::Log),
            Target::Pool => false,
        };
        if wanted {
            sections.push((format!("pool.{}", kind), kind.property_names()));
        }
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Section", "Property"]);
    for (section, properties) in sections {
        for property in properties {
            table.add_row(vec![section.as_str(), property]);
        }
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_datasource_falls_back_to_primary() {
        let mut properties = DynamicDataSourceProperties::default();
        properties
            .datasource
            .insert("master".into(), DataSourceProperty::new("sqlite:master.db"));
        properties
            .datasource
            .insert("report".into(), DataSourceProperty::new("sqlite:report.db"));

        let report = resolve_datasource(&properties, "report").unwrap();
        assert_eq!(report.url, "sqlite:report.db");
        let fallback = resolve_datasource(&properties, "slave_1").unwrap();
        assert_eq!(fallback.url, "sqlite:master.db");

        properties.strict = true;
        let err = resolve_datasource(&properties, "slave_1").unwrap_err();
        assert!(err.to_string().contains("slave_1"));
    }

    #[test]
    fn test_validate_needs_url_or_datasource() {
        assert!(Cli::try_parse_from(["dynds", "validate"]).is_err());
        assert!(Cli::try_parse_from(["dynds", "validate", "--url", "sqlite::memory:"]).is_ok());
        assert!(Cli::try_parse_from(["dynds", "validate", "--datasource", "master"]).is_ok());
        assert!(
            Cli::try_parse_from([
                "dynds",
                "validate",
                "--url",
                "sqlite::memory:",
                "--datasource",
                "master"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_properties_default_target() {
        let cli = Cli::try_parse_from(["dynds", "properties"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Properties {
                target: Target::Pool
            }
        ));
    }
}
