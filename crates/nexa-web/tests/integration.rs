//! Integration tests for broker configuration and the single-instance guard.

use std::sync::Arc;
use std::time::Duration;

use nexa_vault::SessionStore;
use nexa_web::{BrokerConfig, BrokerServer, WebError, acquire_port};

#[test]
fn broker_config_defaults() {
    let config = BrokerConfig::default();
    assert_eq!(config.bind_addr, "127.0.0.1");
    assert_eq!(config.port, 8765);
    assert_eq!(config.ttl, Duration::from_secs(1800));
}

#[tokio::test]
async fn second_bind_on_held_port_fails_with_port_in_use() {
    let first = acquire_port("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = first.local_addr().unwrap().to_string();

    match acquire_port(&addr).await {
        Err(WebError::PortInUse { addr: reported }) => assert_eq!(reported, addr),
        Err(other) => panic!("expected PortInUse, got {other}"),
        Ok(_) => panic!("second broker bound an occupied port"),
    }
}

#[tokio::test]
async fn port_is_free_again_after_first_broker_drops() {
    let first = acquire_port("127.0.0.1:0").await.unwrap();
    let addr = first.local_addr().unwrap().to_string();
    drop(first);

    assert!(acquire_port(&addr).await.is_ok());
}

#[tokio::test]
async fn non_loopback_bind_is_refused() {
    let config = BrokerConfig {
        bind_addr: "0.0.0.0".into(),
        port: 0,
        ..BrokerConfig::default()
    };
    let store = Arc::new(SessionStore::new(config.ttl).unwrap());
    let server = BrokerServer::new(config, store);

    assert!(matches!(
        server.bind().await,
        Err(WebError::NonLoopbackBind { .. })
    ));
}

#[tokio::test]
async fn second_server_refuses_to_start_while_first_runs() {
    let store = Arc::new(SessionStore::new(Duration::from_secs(60)).unwrap());
    let first = acquire_port("127.0.0.1:0").await.unwrap();
    let port = first.local_addr().unwrap().port();

    let config = BrokerConfig {
        port,
        ..BrokerConfig::default()
    };
    let second = BrokerServer::new(config, store);

    assert!(matches!(second.start().await, Err(WebError::PortInUse { .. })));
}
