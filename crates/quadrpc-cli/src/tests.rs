use super::*;

fn serve_options() -> ServeOptions {
    ServeOptions {
        addr: "127.0.0.1:0".to_string(),
        codec: "postcard".to_string(),
        max_call_timeout_secs: 300,
        max_frame_size: None,
        emit_policy: "on-increase".to_string(),
        greet_step_ms: 1000,
    }
}

#[test]
fn test_resolve_addr_precedence() {
    assert_eq!(
        resolve_addr(Some("10.0.0.1:1".into()), Some("10.0.0.2:2".into())),
        "10.0.0.1:1"
    );
    assert_eq!(resolve_addr(None, Some("10.0.0.2:2".into())), "10.0.0.2:2");
    assert_eq!(resolve_addr(None, None), "127.0.0.1:50051");
    assert_eq!(resolve_addr(None, Some("  ".into())), "127.0.0.1:50051");
}

#[test]
fn test_parse_codec() {
    assert_eq!(parse_codec("postcard").unwrap(), Codec::Postcard);
    assert_eq!(parse_codec("json").unwrap(), Codec::Json);
    assert!(parse_codec("xml").is_err());
}

#[test]
fn test_parse_emit_policy() {
    assert_eq!(parse_emit_policy("on-increase").unwrap(), EmitPolicy::OnIncrease);
    assert_eq!(parse_emit_policy("every-element").unwrap(), EmitPolicy::EveryElement);
    assert!(parse_emit_policy("never").is_err());
}

#[test]
fn test_server_config_from_options() {
    let mut options = serve_options();
    options.codec = "json".to_string();
    options.max_frame_size = Some(4096);
    options.emit_policy = "every-element".to_string();
    options.greet_step_ms = 50;

    let config = options.server_config().unwrap();
    assert_eq!(config.bind_addr, "127.0.0.1:0");
    assert_eq!(config.codec, Codec::Json);
    assert_eq!(config.max_frame_size, 4096);
    assert_eq!(config.emit_policy, EmitPolicy::EveryElement);
    assert_eq!(config.greet_step, Duration::from_millis(50));
}

#[test]
fn test_server_config_rejects_invalid() {
    let mut options = serve_options();
    options.max_call_timeout_secs = 0;
    let err = options.server_config().unwrap_err();
    assert!(err.to_string().contains("Invalid server configuration"));

    let mut options = serve_options();
    options.greet_step_ms = 0;
    assert!(options.server_config().is_err());
}

#[test]
fn test_client_config() {
    let config = client_config("json", Some(250)).unwrap();
    assert_eq!(config.codec, Codec::Json);
    assert_eq!(config.default_timeout, Some(Duration::from_millis(250)));

    assert!(client_config("postcard", None).unwrap().default_timeout.is_none());
    assert!(client_config("postcard", Some(0)).is_err());
}
