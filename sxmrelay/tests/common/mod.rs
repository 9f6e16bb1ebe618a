//! Mock SiriusXM endpoints shared by the integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use sxmrelay::{Clock, Credentials, ManualClock, Region, SiriusXmRelay};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REST: &str = "/rest/v2/experience/modules";
pub const LOGIN_PATH: &str = "/rest/v2/experience/modules/modify/authentication";
pub const RESUME_PATH: &str = "/rest/v2/experience/modules/resume";
pub const CATALOG_PATH: &str = "/rest/v2/experience/modules/get";
pub const NOW_PLAYING_PATH: &str = "/rest/v2/experience/modules/tune/now-playing-live";

pub const MASTER_PATH: &str = "/AAC_Data/9450/9450_variant_large_v3.m3u8";
pub const VARIANT_PATH: &str = "/AAC_Data/9450/HLS_9450_256k_v3/9450_256k_large_v3.m3u8";
pub const SEGMENT_DIR: &str = "/AAC_Data/9450/HLS_9450_256k_v3";

pub const MEDIA_PLAYLIST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-KEY:METHOD=AES-128,URI=\"key/1\"\n#EXTINF:10.0,\n9450_256k_1_001.aac\n#EXTINF:10.0,\n9450_256k_1_002.aac\n";

pub fn status_body(status: i64) -> Value {
    json!({"ModuleListResponse": {"status": status, "messages": [{"code": 100, "message": "Success"}]}})
}

pub fn login_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(status_body(1))
        .append_header("set-cookie", "SXMDATA=%7B%22gupId%22%3A%22GUP-1%22%7D; Path=/")
        .append_header("set-cookie", "SXMAKTOKEN=token=tok-login,expires=0; Path=/")
}

pub fn resume_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(status_body(1))
        .append_header("set-cookie", "AWSALB=lb-1; Path=/")
        .append_header("set-cookie", "JSESSIONID=sid-1; Path=/")
        .append_header("set-cookie", "SXMAKTOKEN=token=tok-resume,expires=0; Path=/")
}

pub async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(login_response())
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(RESUME_PATH))
        .respond_with(resume_response())
        .mount(server)
        .await;
}

pub fn catalog_body() -> Value {
    json!({"ModuleListResponse": {"status": 1, "moduleList": {"modules": [{
        "moduleResponse": {"contentData": {"channelListing": {"channels": [
            {"channelId": "9450", "channelGuid": "guid-octane", "name": "Octane", "siriusChannelNumber": "37", "isFavorite": true},
            {"channelId": "howard100", "channelGuid": "guid-howard", "name": "Howard 100", "siriusChannelNumber": 100},
            {"channelId": "direct1", "name": "Direct Only", "siriusChannelNumber": "900"}
        ]}}}
    }]}}})
}

pub async fn mount_catalog(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
        .mount(server)
        .await;
}

pub fn now_playing_body(code: i64) -> Value {
    let message = if code == 100 { "Success" } else { "Session expired" };
    let master = format!("%Live_Primary_HLS%{MASTER_PATH}");
    json!({"ModuleListResponse": {
        "status": 1,
        "messages": [{"code": code, "message": message}],
        "moduleList": {"modules": [{"moduleResponse": {"liveChannelData": {"hlsAudioInfos": [
            {"name": "primary", "size": "SMALL", "url": "%Live_Primary_HLS%/AAC_Data/9450/9450_small_v3.m3u8"},
            {"name": "primary", "size": "LARGE", "url": master}
        ]}}}]}
    }})
}

pub async fn mount_now_playing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(NOW_PLAYING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(now_playing_body(100)))
        .mount(server)
        .await;
}

/// Master listing, variant probe and variant playlist for channel 9450
pub async fn mount_stream(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(MASTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=281600\nHLS_9450_256k_v3/9450_256k_large_v3.m3u8\n",
        ))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(VARIANT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(VARIANT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(MEDIA_PLAYLIST))
        .mount(server)
        .await;
}

pub async fn mount_all(server: &MockServer) {
    mount_auth(server).await;
    mount_catalog(server).await;
    mount_now_playing(server).await;
    mount_stream(server).await;
}

pub fn relay(server: &MockServer) -> SiriusXmRelay {
    SiriusXmRelay::builder(Credentials::new("me@example.com", "secret"))
        .region(Region::Us)
        .rest_base(format!("{}{}", server.uri(), REST))
        .hls_host(server.uri())
        .build()
        .unwrap()
}

/// Clock pinned to a whole second, as persisted timestamps are
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()))
}

pub fn relay_with_clock(server: &MockServer, clock: Arc<dyn Clock>) -> SiriusXmRelay {
    SiriusXmRelay::builder(Credentials::new("me@example.com", "secret"))
        .rest_base(format!("{}{}", server.uri(), REST))
        .hls_host(server.uri())
        .clock(clock)
        .build()
        .unwrap()
}

/// Number of requests received on `request_path`, any method
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}
