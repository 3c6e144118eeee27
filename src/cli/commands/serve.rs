//! Web server command.

use console::style;

use crate::config::Settings;

/// Start the web server.
pub async fn cmd_serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let bind = parse_bind_address(bind);

    if settings.api_secret_key.is_none() {
        println!(
            "{} API_SECRET_KEY is not set; uploads are unauthenticated",
            style("!").yellow()
        );
    }
    println!("{} Starting beo-split server at http://{}", style("→").cyan(), bind);
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, &bind).await
}

/// Parse a bind address that can be:
/// - Just a port: "8000" -> 0.0.0.0:8000
/// - Just a host: "127.0.0.1" -> 127.0.0.1:8000
/// - Host and port: "127.0.0.1:9000"
fn parse_bind_address(bind: &str) -> String {
    if let Ok(port) = bind.parse::<u16>() {
        return format!("0.0.0.0:{}", port);
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if port_str.parse::<u16>().is_ok() {
            return format!("{}:{}", host, port_str);
        }
    }

    format!("{}:8000", bind)
}
