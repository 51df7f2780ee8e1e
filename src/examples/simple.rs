//! Simple example of using rotating-source.

use reqwest_middleware::ClientBuilder;
use rotating_source::{BindingSocketFactory, RotationConfig, SocketFactory, SourceRotationMiddleware, TcpSocketFactory};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = RotationConfig::builder()
        // addresses must be assigned to a local interface
        .addresses([IpAddr::V4(Ipv4Addr::LOCALHOST)])
        // more addresses, one per line
        // .sources(vec!["/etc/rotating-source/addresses.txt"])
        .connect_timeout(Duration::from_secs(5))
        .request_timeout(Duration::from_secs(10))
        // rate limit for each local address
        .max_requests_per_second(3.0)
        .build();

    println!("Opening raw sockets...");
    let factory = BindingSocketFactory::from_config(TcpSocketFactory::from_config(&config), &config)?;
    for _ in 0..3 {
        let socket = factory.create_socket()?;
        println!("Socket bound to {:?}", socket.local_addr()?.as_socket());
    }

    let rotation = SourceRotationMiddleware::new(config)?;
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(rotation)
        .build();

    println!("Sending request...");
    let response = client.get("http://127.0.0.1:8080/").send().await?;

    println!("Status: {}", response.status());
    println!("Response: {}", response.text().await?);

    Ok(())
}
