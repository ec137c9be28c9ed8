//! agri-seal HTTP server

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agri_seal::server::run().await
}
