use anyhow::Result;
use avrofilter_config::Config;
use avrofilter_proxy::ProxyServer;

pub async fn handle(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    upstream: Option<String>,
) -> Result<()> {
    if let Some(host) = host {
        config.proxy.host = host;
    }
    if let Some(port) = port {
        config.proxy.port = port;
    }
    if let Some(upstream) = upstream {
        config.proxy.upstream = upstream;
    }

    println!(
        "Starting avrofilter proxy on {}:{} -> {}",
        config.proxy.host, config.proxy.port, config.proxy.upstream
    );
    ProxyServer::serve(config).await
}
