use super::parse_sse_request;
use super::query::Query;

async fn parse(path: &str) -> Query {
    warp::test::request()
        .path(path)
        .filter(&parse_sse_request())
        .await
        .expect("in test")
}

#[tokio::test]
async fn paths_resolve_to_stream_names() {
    for (path, stream) in [
        ("/api/v1/streaming/user", "user"),
        ("/api/v1/streaming/user/notification", "user:notification"),
        ("/api/v1/streaming/public", "public"),
        ("/api/v1/streaming/public/local", "public:local"),
        ("/api/v1/streaming/public/remote", "public:remote"),
        ("/api/v1/streaming/direct", "direct"),
        ("/api/v1/streaming/hashtag?tag=a", "hashtag"),
        ("/api/v1/streaming/hashtag/local?tag=a", "hashtag:local"),
        ("/api/v1/streaming/list?list=1", "list"),
    ] {
        assert_eq!(parse(path).await.stream, stream, "{}", path);
    }
}

#[tokio::test]
async fn media_flag_is_truthy_for_1_and_true() {
    assert!(parse("/api/v1/streaming/public?only_media=1").await.media);
    assert!(parse("/api/v1/streaming/public?only_media=true").await.media);
    assert!(!parse("/api/v1/streaming/public?only_media=false").await.media);
    assert!(!parse("/api/v1/streaming/public").await.media);
}

#[tokio::test]
async fn hashtag_and_list_params_are_captured() {
    assert_eq!(parse("/api/v1/streaming/hashtag?tag=Art").await.tag, "Art");
    assert_eq!(parse("/api/v1/streaming/list?list=99").await.list, 99);
}

#[tokio::test]
async fn token_from_query_parameter() {
    let q = parse("/api/v1/streaming/user?access_token=deadbeef").await;
    assert_eq!(q.access_token.as_deref(), Some("deadbeef"));
}

#[tokio::test]
async fn bearer_header_beats_query_parameter() {
    let q = warp::test::request()
        .path("/api/v1/streaming/user?access_token=from_query")
        .header("authorization", "Bearer from_header")
        .filter(&parse_sse_request())
        .await
        .expect("in test");
    assert_eq!(q.access_token.as_deref(), Some("from_header"));
}

#[tokio::test]
async fn no_token_is_fine_at_the_parse_stage() {
    let q = parse("/api/v1/streaming/public").await;
    assert_eq!(q.access_token, None);
}

#[tokio::test]
async fn unknown_paths_do_not_match() {
    assert!(warp::test::request()
        .path("/api/v1/streaming/nonexistent")
        .filter(&parse_sse_request())
        .await
        .is_err());
}
