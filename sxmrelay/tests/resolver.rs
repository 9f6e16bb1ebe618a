//! Catalog lookup and playlist resolution against mocked endpoints

mod common;

use common::*;
use std::sync::Arc;
use sxmrelay::SiriusXmError;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_catalog_is_fetched_once() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_catalog(&server).await;

    let relay = relay(&server);
    let channels = relay.channels().await.unwrap();
    assert_eq!(channels.len(), 3);
    assert_eq!(channels[1].number, "100");

    assert_eq!(
        relay.directory().find("37").await.unwrap(),
        Some(("guid-octane".to_string(), "9450".to_string()))
    );
    assert_eq!(
        relay.directory().find("HOWARD 100").await.unwrap(),
        Some(("guid-howard".to_string(), "howard100".to_string()))
    );
    assert_eq!(relay.directory().find("nope").await.unwrap(), None);
    assert_eq!(hits(&server, CATALOG_PATH).await, 1);

    relay.directory().refresh().await.unwrap();
    assert_eq!(hits(&server, CATALOG_PATH).await, 2);
}

#[tokio::test]
async fn test_concurrent_first_listing_fetches_once() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_catalog(&server).await;

    let relay = Arc::new(relay(&server));
    let tasks = (0..8)
        .map(|_| {
            let relay = relay.clone();
            tokio::spawn(async move { relay.channels().await })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().len(), 3);
    }

    assert_eq!(hits(&server, CATALOG_PATH).await, 1);
    assert_eq!(hits(&server, LOGIN_PATH).await, 1);
}

#[tokio::test]
async fn test_empty_catalog_finds_nothing() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
            {"ModuleListResponse": {"status": 1, "moduleList": {"modules": [{"moduleResponse": {"contentData": {"channelListing": {"channels": []}}}}]}}}
        )))
        .mount(&server)
        .await;

    let relay = relay(&server);
    assert_eq!(relay.directory().find("octane").await.unwrap(), None);
}

#[tokio::test]
async fn test_resolution_is_cached() {
    let server = MockServer::start().await;
    mount_all(&server).await;

    let relay = relay(&server);
    let resolver = relay.resolver();

    let first = resolver
        .resolve_playlist_url("guid-octane", "9450", true, 3)
        .await
        .unwrap();
    let second = resolver
        .resolve_playlist_url("guid-octane", "9450", true, 3)
        .await
        .unwrap();

    assert_eq!(first, format!("{}{}", server.uri(), VARIANT_PATH));
    assert_eq!(first, second);
    assert_eq!(hits(&server, NOW_PLAYING_PATH).await, 1);

    let state = resolver.path_state("9450").unwrap();
    assert_eq!(state.base_path.as_deref(), Some("/AAC_Data/9450"));
    assert_eq!(state.subdirectory.as_deref(), Some("HLS_9450_256k_v3"));

    resolver
        .resolve_playlist_url("guid-octane", "9450", false, 3)
        .await
        .unwrap();
    assert_eq!(hits(&server, NOW_PLAYING_PATH).await, 2);
}

#[tokio::test]
async fn test_now_playing_request_parameters() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_stream(&server).await;
    Mock::given(method("GET"))
        .and(path(NOW_PLAYING_PATH))
        .and(query_param("assetGUID", "guid-octane"))
        .and(query_param("channelId", "9450"))
        .and(query_param("ccRequestType", "AUDIO_VIDEO"))
        .and(query_param("hls_output_mode", "custom"))
        .and(query_param("marker_mode", "all_separate_cue_points"))
        .and(query_param("result-template", "web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(now_playing_body(100)))
        .mount(&server)
        .await;

    let relay = relay(&server);
    relay
        .resolver()
        .resolve_playlist_url("guid-octane", "9450", true, 3)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expired_session_is_renewed() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_stream(&server).await;
    Mock::given(method("GET"))
        .and(path(NOW_PLAYING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(now_playing_body(201)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_now_playing(&server).await;

    let relay = relay(&server);
    let url = relay
        .resolver()
        .resolve_playlist_url("guid-octane", "9450", true, 3)
        .await
        .unwrap();

    assert!(url.ends_with(VARIANT_PATH));
    assert_eq!(hits(&server, NOW_PLAYING_PATH).await, 2);
    assert_eq!(hits(&server, RESUME_PATH).await, 2);
}

#[tokio::test]
async fn test_expired_session_budget_is_bounded() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path(NOW_PLAYING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(now_playing_body(208)))
        .mount(&server)
        .await;

    let relay = relay(&server);
    let err = relay
        .resolver()
        .resolve_playlist_url("guid-octane", "9450", true, 2)
        .await
        .unwrap_err();

    assert!(err.is_session_expired());
    assert_eq!(hits(&server, NOW_PLAYING_PATH).await, 3);
}

#[tokio::test]
async fn test_unexpected_code_fails() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path(NOW_PLAYING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(now_playing_body(300)))
        .mount(&server)
        .await;

    let relay = relay(&server);
    let err = relay
        .resolver()
        .resolve_playlist_url("guid-octane", "9450", true, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, SiriusXmError::UpstreamLogic { code: 300, .. }));
}

#[tokio::test]
async fn test_unprobed_variant_is_used_best_effort() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_now_playing(&server).await;
    Mock::given(method("GET"))
        .and(path(MASTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=281600\nHLS_9450_256k_v3/9450_256k_large_v3.m3u8\n",
        ))
        .mount(&server)
        .await;

    let relay = relay(&server);
    let url = relay
        .resolver()
        .resolve_playlist_url("guid-octane", "9450", true, 3)
        .await
        .unwrap();
    assert_eq!(url, format!("{}{}", server.uri(), VARIANT_PATH));
}

#[tokio::test]
async fn test_failed_listing_falls_back_to_direct_layout() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_now_playing(&server).await;
    Mock::given(method("HEAD"))
        .and(path("/AAC_Data/9450/9450_256k_large_v3.m3u8"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let relay = relay(&server);
    let url = relay
        .resolver()
        .resolve_playlist_url("guid-octane", "9450", true, 3)
        .await
        .unwrap();

    assert_eq!(
        url,
        format!("{}/AAC_Data/9450/9450_256k_large_v3.m3u8", server.uri())
    );
    let state = relay.resolver().path_state("9450").unwrap();
    assert_eq!(state.base_path.as_deref(), Some("/AAC_Data/9450"));
    assert_eq!(state.subdirectory, None);
}

#[tokio::test]
async fn test_forbidden_listing_renews_session() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_now_playing(&server).await;
    Mock::given(method("GET"))
        .and(path(MASTER_PATH))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_stream(&server).await;

    let relay = relay(&server);
    let url = relay
        .resolver()
        .resolve_playlist_url("guid-octane", "9450", true, 3)
        .await
        .unwrap();

    assert!(url.ends_with(VARIANT_PATH));
    assert_eq!(hits(&server, RESUME_PATH).await, 2);
}

#[tokio::test]
async fn test_direct_resolution_uses_legacy_layouts() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("HEAD"))
        .and(path("/AAC_Data/direct1/HLS_direct1_128k_v2/direct1_128k_v2.m3u8"))
        .and(query_param("consumer", "k2"))
        .and(query_param("token", "tok-resume"))
        .and(query_param("gupId", "GUP-1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let relay = relay(&server);
    let url = relay.resolver().resolve_direct("direct1", true).await.unwrap();

    assert!(url.ends_with("/AAC_Data/direct1/HLS_direct1_128k_v2/direct1_128k_v2.m3u8"));
    assert_eq!(relay.resolver().cached_url("direct1").await, Some(url));
}

#[tokio::test]
async fn test_direct_resolution_exhausted() {
    let server = MockServer::start().await;
    mount_auth(&server).await;

    let relay = relay(&server);
    let err = relay.resolver().resolve_direct("ghost", true).await.unwrap_err();
    assert!(matches!(err, SiriusXmError::NotFound(_)));
}
