use anyhow::{anyhow, bail, Context};
use payswitch::config::RootConfig;
use payswitch::logging::init_logging;
use payswitch::{PaymentSwitch, Provider};
use std::path::PathBuf;

const USAGE: &str = "usage: payswitch providers | payswitch status <PROVIDER> <TRANSACTION_ID>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config file, then PAYSWITCH__* overrides
    let path = std::env::var_os("PAYSWITCH_CONFIG").map(PathBuf::from);
    let config = RootConfig::load(path.as_deref()).context("Failed to load configuration")?;

    init_logging(&config.logging)?;
    tracing::info!("Starting payswitch ({:?})", config.environment);

    let switch = PaymentSwitch::new(config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["providers"] => {
            for provider in switch.providers() {
                let marker = if provider == switch.default_provider() {
                    " (default)"
                } else {
                    ""
                };
                println!("{}{}", provider, marker);
            }
        }
        ["status", provider, transaction_id] => {
            let provider: Provider = provider.parse()?;
            let status = switch
                .check_status_detail(Some(provider), transaction_id)
                .await
                .with_context(|| format!("Status check failed for {}", transaction_id))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        [] => bail!(USAGE),
        other => return Err(anyhow!("unknown command {:?}\n{}", other, USAGE)),
    }

    Ok(())
}
