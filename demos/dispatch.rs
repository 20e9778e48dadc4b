use resilient_http::{Body, Dispatcher, Request};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let uri = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/status/503".to_owned());

    let dispatcher = Dispatcher::from_env().map_err(anyhow::Error::msg)?;
    println!("dispatching GET {uri} with {:?}", dispatcher.config());

    let response = dispatcher
        .dispatch(&Request::get(uri).with_header("Accept", "application/json"))
        .await?;

    println!("{} {}", response.status_code, response.status_message);
    match &response.body {
        Body::Json(value) => println!("{value:#}"),
        Body::Text(text) => println!("{text}"),
        Body::Empty => println!("(no body)"),
    }

    Ok(())
}
