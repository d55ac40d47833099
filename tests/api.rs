mod common;

use reqwest::StatusCode;
use serde_json::Value;

use common::TestServer;

const PAYLOAD: &[u8] = b"wharf patch bytes";

/// Registers one file on a build, uploads `body` to its presigned URL and
/// finalizes it. Returns the file id.
async fn push_file(server: &TestServer, key: &str, build_id: i64, kind: &str, body: &[u8]) -> i64 {
    let resp: Value = server
        .client
        .post(server.url(&format!("/wharf/builds/{build_id}/files")))
        .bearer_auth(key)
        .form(&[("type", kind), ("sub_type", "default")])
        .send()
        .await
        .expect("create build file")
        .json()
        .await
        .expect("parse build file");

    let file_id = resp["file"]["id"].as_i64().expect("file id");
    let upload_url = resp["file"]["upload_url"].as_str().expect("upload url");

    let put = server
        .client
        .put(upload_url)
        .body(body.to_vec())
        .send()
        .await
        .expect("upload blob");
    assert_eq!(put.status(), StatusCode::OK);

    let resp = server
        .client
        .post(server.url(&format!("/wharf/builds/{build_id}/files/{file_id}")))
        .bearer_auth(key)
        .form(&[("size", body.len().to_string())])
        .send()
        .await
        .expect("finalize build file");
    assert_eq!(resp.status(), StatusCode::OK);

    let json: Value = resp.json().await.expect("parse finalize");
    assert_eq!(json["file"]["state"], "uploaded");
    assert_eq!(json["file"]["size"], body.len() as i64);

    file_id
}

async fn create_build(server: &TestServer, key: &str, target: &str, channel: &str) -> Value {
    let resp = server
        .client
        .post(server.url("/wharf/builds"))
        .bearer_auth(key)
        .form(&[("target", target), ("channel", channel), ("user_version", "1.0.0")])
        .send()
        .await
        .expect("create build");
    assert_eq!(resp.status(), StatusCode::OK);
    resp.json().await.expect("parse build")
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_status_requires_key() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(server.url("/wharf/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key("www-authenticate"));
    let json: Value = resp.json().await.unwrap();
    assert!(json["errors"].as_array().is_some_and(|e| !e.is_empty()));

    let resp = server
        .client
        .get(server.url("/wharf/status"))
        .bearer_auth("berth_nope_nope")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = server
        .client
        .get(server.url("/wharf/status"))
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["ok"], true);
}

#[tokio::test]
async fn test_push_flow_publishes_builds_on_channel() {
    let server = TestServer::start().await;
    let key = server.alice_key.clone();

    let first = create_build(&server, &key, "alice/demo", "windows").await;
    let first_id = first["build"]["id"].as_i64().expect("build id");
    assert!(first["build"].get("parentBuild").is_none());

    push_file(&server, &key, first_id, "patch", PAYLOAD).await;

    let resp: Value = server
        .client
        .get(server.url("/wharf/channels"))
        .query(&[("target", "alice/demo")])
        .bearer_auth(&key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let head = &resp["channels"]["windows"]["head"];
    assert_eq!(head["id"], first_id);
    assert_eq!(head["state"], "completed");

    let second = create_build(&server, &key, "alice/demo", "windows").await;
    assert_eq!(second["build"]["parentBuild"]["id"], first_id);
    let second_id = second["build"]["id"].as_i64().unwrap();

    push_file(&server, &key, second_id, "patch", PAYLOAD).await;

    let resp: Value = server
        .client
        .get(server.url("/wharf/channels/windows"))
        .query(&[("target", "alice/demo")])
        .bearer_auth(&key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["channel"]["name"], "windows");
    assert_eq!(resp["channel"]["head"]["id"], second_id);
    assert_eq!(resp["channel"]["head"]["parent_build_id"], first_id);
}

#[tokio::test]
async fn test_json_bodies_are_accepted() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(server.url("/wharf/builds"))
        .bearer_auth(&server.alice_key)
        .json(&serde_json::json!({"target": "alice/demo", "channel": "linux"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["build"]["state"], "started");
}

#[tokio::test]
async fn test_missing_fields_are_bad_requests() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(server.url("/wharf/builds"))
        .bearer_auth(&server.alice_key)
        .form(&[("channel", "windows")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .client
        .post(server.url("/wharf/builds"))
        .bearer_auth(&server.alice_key)
        .form(&[("target", "nodash"), ("channel", "windows")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .client
        .get(server.url("/wharf/builds/abc/files"))
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_namespace_is_forbidden() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(server.url("/wharf/builds"))
        .bearer_auth(&server.bob_key)
        .form(&[("target", "alice/demo"), ("channel", "windows")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let build = create_build(&server, &server.alice_key, "alice/demo", "windows").await;
    let build_id = build["build"]["id"].as_i64().unwrap();

    let resp = server
        .client
        .get(server.url(&format!("/wharf/builds/{build_id}/files")))
        .bearer_auth(&server.bob_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Admins may act in any namespace.
    let resp = server
        .client
        .get(server.url(&format!("/wharf/builds/{build_id}/files")))
        .bearer_auth(&server.admin_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_channel_is_not_found() {
    let server = TestServer::start().await;
    create_build(&server, &server.alice_key, "alice/demo", "windows").await;

    let resp = server
        .client
        .get(server.url("/wharf/channels/beta"))
        .query(&[("target", "alice/demo")])
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_finalize_before_upload_is_rejected() {
    let server = TestServer::start().await;
    let build = create_build(&server, &server.alice_key, "alice/demo", "windows").await;
    let build_id = build["build"]["id"].as_i64().unwrap();

    let resp: Value = server
        .client
        .post(server.url(&format!("/wharf/builds/{build_id}/files")))
        .bearer_auth(&server.alice_key)
        .form(&[("type", "patch")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let file_id = resp["file"]["id"].as_i64().unwrap();
    assert_eq!(resp["file"]["state"], "uploading");

    let resp = server
        .client
        .post(server.url(&format!("/wharf/builds/{build_id}/files/{file_id}")))
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_files_listing_includes_assembled_archive() {
    let server = TestServer::start().await;
    let build = create_build(&server, &server.alice_key, "alice/demo", "windows").await;
    let build_id = build["build"]["id"].as_i64().unwrap();

    push_file(&server, &server.alice_key, build_id, "patch", PAYLOAD).await;

    let resp: Value = server
        .client
        .get(server.url(&format!("/wharf/builds/{build_id}/files")))
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let files = resp["Files"].as_array().expect("Files array");
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f["state"] == "uploaded"));
    assert!(files.iter().any(|f| f["type"] == "archive"));
    assert!(files.iter().all(|f| f.get("subType").is_some()));
}

#[tokio::test]
async fn test_download_redirects_to_signed_url() {
    let server = TestServer::start().await;
    let build = create_build(&server, &server.alice_key, "alice/demo", "windows").await;
    let build_id = build["build"]["id"].as_i64().unwrap();

    let file_id = push_file(&server, &server.alice_key, build_id, "patch", PAYLOAD).await;

    let resp = server
        .client
        .get(server.url(&format!(
            "/wharf/builds/{build_id}/files/{file_id}/download"
        )))
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = resp
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string();
    assert!(location.starts_with(&server.base_url));
    assert!(location.contains("op=get"));

    let resp = server.client.get(&location).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&resp.bytes().await.unwrap()[..], PAYLOAD);

    let tampered = format!("{}0", location);
    let resp = server.client.get(&tampered).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // A download signature cannot be replayed as an upload.
    let resp = server
        .client
        .put(&location)
        .body("overwrite")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upload_url_cannot_replace_finalized_object() {
    let server = TestServer::start().await;
    let key = server.alice_key.clone();
    let build = create_build(&server, &key, "alice/demo", "windows").await;
    let build_id = build["build"]["id"].as_i64().unwrap();

    let resp: Value = server
        .client
        .post(server.url(&format!("/wharf/builds/{build_id}/files")))
        .bearer_auth(&key)
        .form(&[("type", "patch")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let file_id = resp["file"]["id"].as_i64().unwrap();
    let upload_url = resp["file"]["upload_url"].as_str().unwrap().to_string();

    let put = server.client.put(&upload_url).body(PAYLOAD.to_vec()).send().await.unwrap();
    assert_eq!(put.status(), StatusCode::OK);

    let resp = server
        .client
        .post(server.url(&format!("/wharf/builds/{build_id}/files/{file_id}")))
        .bearer_auth(&key)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let again = server
        .client
        .put(&upload_url)
        .body("different and longer bytes")
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let resp = server
        .client
        .get(server.url(&format!("/wharf/builds/{build_id}/files/{file_id}/download")))
        .bearer_auth(&key)
        .send()
        .await
        .unwrap();
    let location = resp.headers()["location"].to_str().unwrap().to_string();
    let body = server.client.get(&location).send().await.unwrap().bytes().await.unwrap();
    assert_eq!(&body[..], PAYLOAD);
}

#[tokio::test]
async fn test_blobs_land_in_data_dir() {
    let server = TestServer::start().await;
    let build = create_build(&server, &server.alice_key, "alice/demo", "windows").await;
    let build_id = build["build"]["id"].as_i64().unwrap();

    push_file(&server, &server.alice_key, build_id, "patch", PAYLOAD).await;

    let build_dir = server.data_dir().join("blobs/builds").join(build_id.to_string());
    assert!(build_dir.is_dir());
    assert!(build_dir.join("files").is_dir());
}

#[tokio::test]
async fn test_profile_and_games() {
    let server = TestServer::start().await;

    let resp: Value = server
        .client
        .get(server.url("/profile"))
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["user"]["username"], "alice");

    create_build(&server, &server.alice_key, "alice/demo", "windows").await;

    let resp: Value = server
        .client
        .get(server.url("/profile/games"))
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let games = resp["games"].as_array().unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0]["title"], "demo");

    let resp: Value = server
        .client
        .get(server.url("/builds/1"))
        .bearer_auth(&server.alice_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["build"]["id"], 1);
    assert_eq!(resp["build"]["user_version"], "1.0.0");
}

#[tokio::test]
async fn test_game_and_upload_reads() {
    let server = TestServer::start().await;
    let key = server.alice_key.clone();

    let first = create_build(&server, &key, "alice/demo", "windows").await;
    let second = create_build(&server, &key, "alice/demo", "windows").await;
    let upload_id = first["build"]["uploadId"].as_i64().unwrap();

    let get = |path: String, key: String| {
        let request = server.client.get(server.url(&path)).bearer_auth(key);
        async move { request.send().await.unwrap() }
    };

    let upload: Value = get(format!("/uploads/{upload_id}"), key.clone())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(upload["upload"]["filename"], "demo.zip");
    let game_id = upload["upload"]["game_id"].as_i64().unwrap();

    let game: Value = get(format!("/games/{game_id}"), key.clone())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(game["game"]["title"], "demo");
    assert_eq!(game["game"]["type"], "default");
    assert_eq!(game["game"]["user"]["username"], "alice");

    let uploads: Value = get(format!("/games/{game_id}/uploads"), key.clone())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(uploads["uploads"].as_array().unwrap().len(), 1);

    let builds: Value = get(format!("/uploads/{upload_id}/builds"), key.clone())
        .await
        .json()
        .await
        .unwrap();
    let builds = builds["builds"].as_array().unwrap();
    assert_eq!(builds.len(), 2);
    assert_eq!(builds[0]["id"], second["build"]["id"]);
    assert_eq!(builds[0]["parent_build_id"], first["build"]["id"]);

    let denied = get(format!("/games/{game_id}"), server.bob_key.clone()).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    let denied = get(format!("/uploads/{upload_id}/builds"), server.bob_key.clone()).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let missing = get("/uploads/999".to_string(), key.clone()).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let malformed = get("/games/abc".to_string(), key).await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}
