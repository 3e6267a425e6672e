//! virtsnap operator - scheduled snapshots for KubeVirt VirtualMachines

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};

use virtsnap_common::crd::{VirtualMachineSnapshot, VirtualMachineSnapshotSchedule};
use virtsnap_common::telemetry::{init_telemetry, TelemetrySettings};
use virtsnap_operator::{controller_runner, ControllerConfig};

/// virtsnap - scheduled point-in-time snapshots for VirtualMachines
#[derive(Parser, Debug)]
#[command(name = "virtsnap-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the schedule controller (default mode)
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    virtsnap_common::install_crypto_provider();

    let cli = Cli::parse();

    if cli.crd {
        // CRD generation writes plain YAML to stdout; no telemetry needed
        print_crds()?;
        return Ok(());
    }

    init_telemetry(TelemetrySettings::for_service("virtsnap-operator"))?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

fn print_crds() -> anyhow::Result<()> {
    let schedule_crd = serde_yaml::to_string(&VirtualMachineSnapshotSchedule::crd())?;
    let snapshot_crd = serde_yaml::to_string(&VirtualMachineSnapshot::crd())?;
    println!("{schedule_crd}---\n{snapshot_crd}");
    Ok(())
}

async fn run_controller() -> anyhow::Result<()> {
    let client = virtsnap_common::kube_utils::create_client(None).await?;

    ensure_crds_installed(&client).await?;

    let config = ControllerConfig::from_env();
    controller_runner::run_controller(client, config).await;

    Ok(())
}

/// Ensure the virtsnap CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply,
/// so the published schema always matches the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Api, Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(virtsnap_common::FIELD_MANAGER).force();

    tracing::info!("Installing VirtualMachineSnapshotSchedule CRD...");
    crds.patch(
        "virtualmachinesnapshotschedules.snapshot.virtsnap.io",
        &params,
        &Patch::Apply(VirtualMachineSnapshotSchedule::crd()),
    )
    .await?;

    tracing::info!("Installing VirtualMachineSnapshot CRD...");
    crds.patch(
        "virtualmachinesnapshots.snapshot.virtsnap.io",
        &params,
        &Patch::Apply(VirtualMachineSnapshot::crd()),
    )
    .await?;

    Ok(())
}
