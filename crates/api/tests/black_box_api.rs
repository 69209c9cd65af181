use std::time::Duration;

use keystone_api::app::{
    self,
    services::{AppServices, ServicePolicy},
};
use keystone_api::cors::OriginPolicy;
use keystone_auth::{HashingCost, User};
use keystone_infra::Persistable;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

const BASE_PASSWORD: &str = "welcome1";

struct TestServer {
    base_url: String,
    services: AppServices,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Real router on an ephemeral port, with `root` as superuser and
    /// `plain` as an account holding no permissions.
    async fn spawn() -> Self {
        let policy = ServicePolicy {
            base_password: BASE_PASSWORD.to_string(),
            page_size: 20,
            session_ttl: Duration::from_secs(600),
        };
        let services = AppServices::in_memory(HashingCost::minimal(), policy).unwrap();
        services.ensure_superuser("root", "toor").await.unwrap();
        let mut plain = User::new("plain", services.hasher().hash("pw").unwrap());
        plain.create(&*services.store).await.unwrap();

        let origins = OriginPolicy::new(&[r"https://admin\.example\.com"]).unwrap();
        let app = app::build_app(services.clone(), origins);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/api/v1", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A cookie-keeping client logged in as `username`.
    async fn login(&self, username: &str, password: &str) -> Client {
        let client = Client::builder().cookie_store(true).build().unwrap();
        let res = client
            .post(self.url("/user/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "login as {username}");
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn post_json(client: &Client, url: String, body: Value) -> (StatusCode, Value) {
    let res = client.post(url).json(&body).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn ping_is_public() {
    let srv = TestServer::spawn().await;
    let res = Client::new().get(srv.url("/ping")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn gated_endpoints_require_a_session() {
    let srv = TestServer::spawn().await;
    let client = Client::new();

    for path in ["/users", "/user/1", "/groups", "/permissions", "/user/me"] {
        let res = client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "unauthenticated");
    }

    let res = client
        .get(srv.url("/users"))
        .header("cookie", "keystone_session=0123456789abcdef0123456789abcdef")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let srv = TestServer::spawn().await;
    let client = Client::new();

    let (status, wrong_password) = post_json(
        &client,
        srv.url("/user/login"),
        json!({ "username": "root", "password": "nope" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, unknown_user) = post_json(
        &client,
        srv.url("/user/login"),
        json!({ "username": "ghost", "password": "nope" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_password, unknown_user);
    assert_eq!(unknown_user["error"], "invalid_credentials");

    let res = client
        .post(srv.url("/user/login"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_sets_a_session_cookie_and_hides_the_password() {
    let srv = TestServer::spawn().await;
    let client = Client::new();

    let res = client
        .post(srv.url("/user/login"))
        .json(&json!({ "username": "root", "password": "toor" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("keystone_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=600"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["username"], "root");
    assert_eq!(body["superuser"], true);
    assert!(body.get("password").is_none());
    assert!(body.get("password_hash").is_none());
    assert_eq!(body["group_ids"], json!([]));
}

#[tokio::test]
async fn me_and_logout() {
    let srv = TestServer::spawn().await;
    let client = srv.login("plain", "pw").await;

    let me: Value = client.get(srv.url("/user/me")).send().await.unwrap().json().await.unwrap();
    assert_eq!(me["username"], "plain");

    let res = client.post(srv.url("/user/logout")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client.get(srv.url("/user/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sessions_do_not_outlive_their_username() {
    let srv = TestServer::spawn().await;
    let admin = srv.login("root", "toor").await;
    let (status, created) = post_json(
        &admin,
        srv.url("/user"),
        json!({ "username": "dora", "password": "pw" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();

    // Renaming ends the sessions held under the old name.
    let dora = srv.login("dora", "pw").await;
    let res = admin
        .patch(srv.url(&format!("/user/{id}")))
        .json(&json!({ "username": "dorothy" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = dora.get(srv.url("/user/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // A deleted account's cookie must not act as a re-created namesake.
    let dorothy = srv.login("dorothy", "pw").await;
    let res = admin.delete(srv.url(&format!("/user/{id}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let (status, _) = post_json(
        &admin,
        srv.url("/user"),
        json!({ "username": "dorothy", "password": "other" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let res = dorothy.get(srv.url("/user/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Unrelated sessions survive.
    let res = admin.get(srv.url("/user/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn permission_gate_rejects_before_the_handler_runs() {
    let srv = TestServer::spawn().await;
    let client = srv.login("plain", "pw").await;

    let (status, body) = post_json(
        &client,
        srv.url("/permission"),
        json!({ "name": "smuggled" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let page = srv
        .services
        .store
        .list_permissions(&Default::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn manage_user_through_a_group_opens_the_gate() {
    let srv = TestServer::spawn().await;
    let admin = srv.login("root", "toor").await;

    let (status, perm) = post_json(&admin, srv.url("/permission"), json!({ "name": "manage_user" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, group) = post_json(
        &admin,
        srv.url("/group"),
        json!({ "name": "admins", "permission_ids": [perm["id"]] }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let plain = srv.login("plain", "pw").await;
    let res = plain.get(srv.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let users: Value = admin
        .get(srv.url("/users?search=plain"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let plain_id = users["items"][0]["id"].as_i64().unwrap();

    let res = admin
        .patch(srv.url(&format!("/user/{plain_id}")))
        .json(&json!({ "group_ids": [group["id"]] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = plain.get(srv.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin
        .patch(srv.url(&format!("/user/{plain_id}")))
        .json(&json!({ "group_ids": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = plain.get(srv.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn user_crud_round_trip() {
    let srv = TestServer::spawn().await;
    let admin = srv.login("root", "toor").await;

    let (_, perm) = post_json(&admin, srv.url("/permission"), json!({ "name": "deploy" })).await;
    let (status, created) = post_json(
        &admin,
        srv.url("/user"),
        json!({ "username": "carol", "display_name": "Carol", "permission_ids": [perm["id"]] }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().unwrap();

    // Created without a password: the base password applies.
    srv.login("carol", BASE_PASSWORD).await;

    let detail: Value = admin
        .get(srv.url(&format!("/user/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["display_name"], "Carol");
    assert_eq!(detail["permission_ids"], json!([perm["id"]]));
    assert_eq!(detail["group_ids"], json!([]));

    let res = admin
        .put(srv.url(&format!("/user/{id}")))
        .json(&json!({ "username": "carol", "phone": "555" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let replaced: Value = res.json().await.unwrap();
    assert_eq!(replaced["display_name"], "");
    assert_eq!(replaced["phone"], "555");
    assert_eq!(replaced["permission_ids"], json!([perm["id"]]));

    let (status, body) = post_json(&admin, srv.url("/user"), json!({ "username": "carol" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let res = admin.delete(srv.url(&format!("/user/{id}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = admin.get(srv.url(&format!("/user/{id}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let perm_detail: Value = admin
        .get(srv.url(&format!("/permission/{}", perm["id"])))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(perm_detail["user_ids"], json!([]));
}

#[tokio::test]
async fn group_association_replace_and_validation() {
    let srv = TestServer::spawn().await;
    let admin = srv.login("root", "toor").await;

    let (status, body) = post_json(
        &admin,
        srv.url("/group"),
        json!({ "name": "ops", "permission_ids": [999] }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (_, a) = post_json(&admin, srv.url("/permission"), json!({ "name": "a" })).await;
    let (_, b) = post_json(&admin, srv.url("/permission"), json!({ "name": "b" })).await;
    let (_, group) = post_json(
        &admin,
        srv.url("/group"),
        json!({ "name": "ops", "permission_ids": [a["id"]] }),
    )
    .await;
    let id = group["id"].as_i64().unwrap();

    let res = admin
        .patch(srv.url(&format!("/group/{id}")))
        .json(&json!({ "permission_ids": [b["id"], b["id"]] }))
        .send()
        .await
        .unwrap();
    let patched: Value = res.json().await.unwrap();
    assert_eq!(patched["permission_ids"], json!([b["id"]]));
    assert_eq!(patched["name"], "ops");

    let res = admin
        .patch(srv.url(&format!("/group/{id}")))
        .json(&json!({ "permission_ids": [a["id"], 999] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let detail: Value = admin
        .get(srv.url(&format!("/group/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["permission_ids"], json!([b["id"]]));

    let res = admin.get(srv.url("/group/abc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let (status, _) = post_json(&admin, srv.url("/group"), json!({ "name": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lists_page_and_count() {
    let srv = TestServer::spawn().await;
    let admin = srv.login("root", "toor").await;

    for name in ["perm_a", "perm_b", "perm_c", "other"] {
        let (status, _) = post_json(&admin, srv.url("/permission"), json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let page: Value = admin
        .get(srv.url("/permissions?search=perm_&page=2&pagesize=2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["count"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["name"], "perm_c");

    let supers: Value = admin
        .get(srv.url("/users?superuser=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(supers["count"], 1);
    assert_eq!(supers["items"][0]["username"], "root");

    let res = admin.get(srv.url("/users?page=first")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cors_allows_only_matching_origins() {
    let srv = TestServer::spawn().await;
    let client = Client::new();

    let res = client
        .request(reqwest::Method::OPTIONS, srv.url("/users"))
        .header("origin", "https://admin.example.com")
        .header("access-control-request-method", "PATCH")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers();
    assert_eq!(headers["access-control-allow-origin"], "https://admin.example.com");
    assert_eq!(headers["access-control-allow-credentials"], "true");
    assert_eq!(headers["access-control-max-age"], "172800");

    let res = client
        .get(srv.url("/ping"))
        .header("origin", "https://evil.example.org")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("access-control-allow-origin").is_none());
}
