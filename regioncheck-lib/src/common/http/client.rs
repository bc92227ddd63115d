use std::net::IpAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};

use crate::common::tls::GLOBAL_ROOT_STORE;

pub type HttpClient =
    Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// A client whose connections leave through `local_address`, or through the
/// system default route when `None`.
pub fn new_http_client(
    local_address: Option<IpAddr>,
) -> std::io::Result<HttpClient> {
    crate::setup_default_crypto_provider();

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(GLOBAL_ROOT_STORE.clone())
        .with_no_client_auth();

    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector.set_nodelay(true);
    connector.set_local_address(local_address);

    let connector: hyper_rustls::HttpsConnector<HttpConnector> =
        hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}
