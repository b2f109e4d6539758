use std::sync::Arc;
use std::time::Duration;

use viabridge_proxy::command::RemoteConsole;
use viabridge_proxy::config_loader;
use viabridge_proxy::logger;
use viabridge_proxy::mapper::PassthroughMapper;
use viabridge_proxy::relay::Relay;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logger::init_logger();

    let config = config_loader::load_config("config.yml");
    println!("//////////////////////////////////////////////////");
    println!("// viabridge - protocol bridging proxy");
    println!("// Listening on {}", config.bind_address);
    println!("// Backend at {}", config.backend_address);
    println!(
        "// Bridging client {} <-> backend {}",
        config.protocols.frontend, config.protocols.backend
    );
    println!("//////////////////////////////////////////////////");

    let console = RemoteConsole::new(
        config.console.muip_endpoint.clone(),
        Duration::from_secs(config.console.timeout_secs),
    )?;
    let relay = Arc::new(Relay::new(
        config,
        Arc::new(PassthroughMapper),
        Arc::new(console),
    ));

    tokio::select! {
        result = relay.serve() => {
            if let Err(e) = result {
                log::error!("Relay stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Signal received, stopping service");
        }
    }
    Ok(())
}
