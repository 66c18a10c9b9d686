use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use planetary_bundle::bundle::BundleGraph;
use planetary_bundle::config::CoreConfig;
use planetary_bundle::versioner::ControlNetVersioner;

const USAGE: &str = "Usage:
  cnetbundle [--config <yaml>] convert <input> <output> [--pvl]
  cnetbundle [--config <yaml>] info <input>";

enum Command {
    Convert { input: String, output: String, as_pvl: bool },
    Info { input: String },
}

struct Args {
    config: Option<String>,
    command: Command,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut config = None;
    let mut as_pvl = false;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(args.next().context("--config requires a path")?);
            }
            "--pvl" => as_pvl = true,
            "-h" | "--help" => bail!("{}", USAGE),
            _ if arg.starts_with("--") => bail!("Unknown option {}\n{}", arg, USAGE),
            _ => positional.push(arg),
        }
    }

    let command = match positional.as_slice() {
        [cmd, input, output] if cmd == "convert" => Command::Convert {
            input: input.clone(),
            output: output.clone(),
            as_pvl,
        },
        [cmd, input] if cmd == "info" => Command::Info { input: input.clone() },
        _ => bail!("{}", USAGE),
    };
    Ok(Args { config, command })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let config = match &args.config {
        Some(path) => CoreConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path))?,
        None => CoreConfig::default(),
    };
    let radii = config.radii_table().context("Invalid target radii in config")?;
    let versioner = ControlNetVersioner::new(&radii);

    match args.command {
        Command::Convert { input, output, as_pvl } => {
            let net = versioner
                .read(&input)
                .with_context(|| format!("Failed to read {}", input))?;
            versioner
                .write(&net, &output, as_pvl)
                .with_context(|| format!("Failed to write {}", output))?;
        }
        Command::Info { input } => {
            let net = versioner
                .read(&input)
                .with_context(|| format!("Failed to read {}", input))?;
            let header = &net.header;
            info!("NetworkId:    {}", header.network_id);
            info!("TargetName:   {}", header.target_name);
            info!("UserName:     {}", header.user_name);
            info!("Created:      {}", header.created);
            info!("LastModified: {}", header.last_modified);
            info!("Description:  {}", header.description);
            info!(
                "Points: {} ({} valid), measures: {} ({} valid), images: {}",
                net.num_points(),
                net.num_valid_points(),
                net.num_measures(),
                net.num_valid_measures(),
                net.serial_numbers().len()
            );

            // Size of the adjustment this network would set up
            let graph = BundleGraph::build(&net, &config.bundle)
                .context("Failed to build bundle graph")?;
            info!(
                "Bundle: {} observations, {} unknowns, {} fixed / {} ignored points",
                graph.number_observations,
                graph.number_unknown_parameters,
                graph.number_fixed_points,
                graph.number_ignored_points
            );
        }
    }
    Ok(())
}
