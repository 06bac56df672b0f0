use reqwest::Client;
use std::time::Duration;

pub fn create_http_client(timeout: Option<Duration>) -> reqwest::Result<Client> {
    let mut builder = Client::builder().use_rustls_tls();

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder.build()
}
