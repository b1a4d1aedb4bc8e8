mod controller;
mod host;
mod platform;
mod supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
