// # embedded_planning
//
// Embeds netplace-core the way an orchestrator would during one deploy:
// plan AZ placement for two instance groups, then reserve the addresses
// each planned instance needs and release those of obsolete instances.
//
// ## Configuration
//
// - `NETPLACE_NETWORKING`: `global` (shared record store) or `local`
// - `NETPLACE_STORE_PATH`: JSON record file; in-memory store when unset
// - `NETPLACE_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export NETPLACE_STORE_PATH=/tmp/netplace/ips.json
// export NETPLACE_LOG_LEVEL=debug
//
// embedded_planning
// ```

use std::env;
use std::process::ExitCode;

use anyhow::Result;
use netplace_core::network::{host_network, parse_ip_list};
use netplace_core::placement::InstancePlan;
use netplace_core::{
    AvailabilityZone, ExistingInstance, InstanceRef, IpProvider, IpProviderFactory, JobNetwork,
    Network, NetworkReservation, NetworkingMode, PlacementPlan, PlacementPlanner,
    PlacementRequest, PlannerConfig, RecordStoreConfig, Subnet, TaskContext,
};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy)]
enum DemoExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DemoExitCode> for ExitCode {
    fn from(code: DemoExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

struct Config {
    networking: String,
    store_path: Option<String>,
    log_level: String,
}

impl Config {
    fn from_env() -> Self {
        Self {
            networking: env::var("NETPLACE_NETWORKING").unwrap_or_else(|_| "global".to_string()),
            store_path: env::var("NETPLACE_STORE_PATH").ok(),
            log_level: env::var("NETPLACE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    fn validate(&self) -> Result<()> {
        self.networking.parse::<NetworkingMode>()?;

        if let Some(path) = &self.store_path {
            if path.is_empty() {
                anyhow::bail!("NETPLACE_STORE_PATH cannot be empty when set");
            }
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "NETPLACE_STORE_PATH parent directory does not exist: {}. \
                    Create it first: mkdir -p {}",
                    parent.display(),
                    parent.display()
                );
            }
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => anyhow::bail!(
                "NETPLACE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    fn planner_config(&self) -> Result<PlannerConfig> {
        let record_store = match &self.store_path {
            Some(path) => RecordStoreConfig::File { path: path.clone() },
            None => RecordStoreConfig::Memory,
        };
        Ok(PlannerConfig::new()
            .with_networking(self.networking.parse()?)
            .with_record_store(record_store))
    }
}

/// Two zoned subnets, each with a small static pool
fn private_network() -> Result<Network> {
    let z1 = Subnet::new("private", "10.0.1.0/24".parse()?)
        .with_gateway("10.0.1.1".parse()?)
        .with_static_ips(parse_ip_list(&["10.0.1.10 - 10.0.1.11"])?)
        .with_restricted_ips(parse_ip_list(&["10.0.1.2 - 10.0.1.9"])?)
        .with_azs(["z1"]);
    let z2 = Subnet::new("private", "10.0.2.0/24".parse()?)
        .with_gateway("10.0.2.1".parse()?)
        .with_static_ips(parse_ip_list(&["10.0.2.10 - 10.0.2.11"])?)
        .with_restricted_ips(parse_ip_list(&["10.0.2.2 - 10.0.2.9"])?)
        .with_azs(["z2"]);

    let network = Network::manual("private", vec![z1, z2]);
    network.validate()?;
    Ok(network)
}

fn zones() -> Vec<AvailabilityZone> {
    vec![AvailabilityZone::new("z1"), AvailabilityZone::new("z2")]
}

/// The instance a desired slot will run as
fn owner(group: &str, plan: &InstancePlan) -> Option<InstanceRef> {
    let desired = plan.desired()?;
    let index = desired.index?;
    let id = plan
        .existing()
        .map(|existing| existing.id.clone())
        .unwrap_or_else(|| format!("{}-{}", group, index));
    let instance = InstanceRef::new(id, group, index);
    Some(match &desired.az {
        Some(az) => instance.with_az(az.clone()),
        None => instance,
    })
}

/// Reserve one address on `network_name` for every planned instance
async fn reserve_for_plan(provider: &IpProvider, group: &str, plan: &PlacementPlan, network_name: &str) -> Result<()> {
    for instance_plan in &plan.plans {
        let Some(instance) = owner(group, instance_plan) else {
            continue;
        };

        let held = instance_plan
            .existing()
            .and_then(|existing| existing.ips.get(network_name))
            .and_then(|ips| ips.first().copied());
        let static_ip = instance_plan
            .desired()
            .and_then(|desired| desired.static_ips.get(network_name).copied());

        let mut reservation = match (static_ip, held) {
            (Some(ip), _) => NetworkReservation::new_static(instance.clone(), network_name, ip),
            (None, Some(ip)) => {
                let mut existing = NetworkReservation::existing(instance.clone(), network_name, host_network(ip));
                provider.reserve_existing_ips(&mut existing).await?;
                if existing.is_reserved() {
                    info!(instance = %instance, ip = %ip, "Kept existing address");
                    continue;
                }
                NetworkReservation::new_dynamic(instance.clone(), network_name)
            }
            (None, None) => NetworkReservation::new_dynamic(instance.clone(), network_name),
        };

        provider.reserve(&mut reservation).await?;
        info!(
            instance = %instance,
            az = instance.az.as_deref().unwrap_or("-"),
            ip = ?reservation.ip_addr(),
            "Reserved address"
        );
    }
    Ok(())
}

async fn release_obsolete(provider: &IpProvider, group: &str, plan: &PlacementPlan) -> Result<()> {
    for obsolete in &plan.obsolete {
        let instance = InstanceRef::new(obsolete.id.clone(), group, obsolete.index);
        for (network_name, ips) in &obsolete.ips {
            for ip in ips {
                let reservation = NetworkReservation::existing(instance.clone(), network_name.clone(), host_network(*ip));
                provider.release(&reservation).await?;
            }
        }
    }
    Ok(())
}

async fn run(config: &Config) -> Result<()> {
    let planner_config = config.planner_config()?;
    let task = TaskContext::new(format!("embedded-planning-{}", std::process::id()));
    let factory = IpProviderFactory::from_config(&planner_config, task).await?;
    let planner = PlacementPlanner::new(&planner_config);

    let private = private_network()?;
    let provider = factory.new_ip_provider([private.clone(), Network::dynamic("cloud")])?;
    info!(networking = ?factory.networking(), "Created IP provider");

    // Statically addressed group: every IP decides its instance's zone
    let db_ips = parse_ip_list(&["10.0.1.10", "10.0.2.10", "10.0.1.11", "10.0.2.11"])?;
    let db = PlacementRequest::new("db", 4)
        .with_azs(zones())
        .with_network(JobNetwork::new(private.clone()).with_static_ips(db_ips));
    let db_plan = planner.plan(&db)?;
    reserve_for_plan(&provider, "db", &db_plan, "private").await?;

    // Dynamically addressed group scaling down from a previous deploy
    let web = PlacementRequest::new("web", 3)
        .with_azs(zones())
        .with_network(JobNetwork::new(private.clone()))
        .with_existing([
            ExistingInstance::new("web-0", 0).with_az("z1").with_ip("private", "10.0.1.20".parse()?),
            ExistingInstance::new("web-1", 1).with_az("z1").with_ip("private", "10.0.1.21".parse()?),
            ExistingInstance::new("web-2", 2).with_az("z1").with_ip("private", "10.0.1.22".parse()?),
            ExistingInstance::new("web-3", 3).with_az("z3").with_ip("private", "10.0.9.23".parse()?),
        ]);
    let web_plan = planner.plan(&web)?;
    release_obsolete(&provider, "web", &web_plan).await?;
    reserve_for_plan(&provider, "web", &web_plan, "private").await?;

    for obsolete in &web_plan.obsolete {
        warn!(instance = %obsolete.name("web"), "Instance is obsolete and will be deleted");
    }

    println!("{}", serde_json::to_string_pretty(&db_plan.static_ips)?);
    println!("{}", serde_json::to_string_pretty(&web_plan.instances)?);
    Ok(())
}

fn main() -> ExitCode {
    let config = Config::from_env();
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DemoExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DemoExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DemoExitCode::RuntimeError.into();
        }
    };

    match rt.block_on(run(&config)) {
        Ok(()) => DemoExitCode::Success.into(),
        Err(e) => {
            error!("Planning failed: {:#}", e);
            DemoExitCode::RuntimeError.into()
        }
    }
}
