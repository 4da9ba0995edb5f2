use mediot_bridge::{BridgeArgs, run_bridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_bridge(BridgeArgs::parse()).await
}
