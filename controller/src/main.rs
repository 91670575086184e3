mod bus;
mod control;
mod host;
mod relay;
mod sensor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
