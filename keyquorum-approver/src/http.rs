use std::{error::Error, ops::Deref, ops::DerefMut, sync::Arc};

use actix_cors::Cors;
use actix_web::{
    dev::Server,
    get,
    http::header::{ACCEPT, CONTENT_TYPE},
    post, web, App, HttpResponse, HttpServer, Responder,
};
use serde_json::json;
use tokio::time::Instant;

use keyquorum_core::{actix_cors, actix_web, anyhow, serde_json, tokio};
use keyquorum_http::{
    http_error, log_request, ApprovalNotice, DecisionRequest, HttpError, ListRequestsQuery,
    VersionResponse,
};

use crate::ApprovalServer;

const LOG_TARGET: &str = "keyquorum_approver::http";

pub struct ApproverHttpServer {
    inner: Server,
}

#[derive(Clone)]
pub struct ApproverHttpServerData {
    server: Arc<ApprovalServer>,
}

impl ApproverHttpServerData {
    pub fn new(server: Arc<ApprovalServer>) -> Self {
        ApproverHttpServerData { server }
    }
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1024 * 1024)
        .error_handler(|err, _req| HttpError::BadRequest(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(approval)
        .service(decision)
        .service(approvals)
        .service(redeliver)
        .service(version);
}

impl ApproverHttpServer {
    pub async fn new(server: Arc<ApprovalServer>, http_addr: &str) -> anyhow::Result<Self> {
        let data = web::Data::new(ApproverHttpServerData::new(server));
        let inner = HttpServer::new(move || {
            // Decisions are usually taken from a browser UI
            let cors = Cors::default()
                .allow_any_origin()
                .allowed_methods(vec!["GET", "POST"])
                .allowed_headers(vec![ACCEPT, CONTENT_TYPE])
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(json_config())
                .app_data(data.clone())
                .configure(configure)
        })
        .system_exit()
        .disable_signals()
        .shutdown_timeout(0)
        .bind(http_addr)?
        .run();

        Ok(ApproverHttpServer { inner })
    }

    pub async fn listen(self) -> Result<(), Box<dyn Error>> {
        Ok(self.inner.await?)
    }
}

#[post("/approval")]
async fn approval(
    state: web::Data<ApproverHttpServerData>,
    notice: web::Json<ApprovalNotice>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let notice = notice.into_inner();
    let client_id = notice.client_id.clone();
    let res = state
        .server
        .receive_task(notice)
        .await
        .map_err(http_error);
    log_request(LOG_TARGET, "POST", "/approval", 202, &res, start);
    let created = res?;
    Ok(HttpResponse::Accepted().json(json!({
        "client_id": client_id,
        "created": created,
    })))
}

#[post("/decision")]
async fn decision(
    state: web::Data<ApproverHttpServerData>,
    req: web::Json<DecisionRequest>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let req = req.into_inner();
    let res = state
        .server
        .submit_decision(&req.client_id, req.decision)
        .await
        .map_err(http_error);
    log_request(LOG_TARGET, "POST", "/decision", 200, &res, start);
    Ok(web::Json(res?))
}

#[get("/approvals")]
async fn approvals(
    state: web::Data<ApproverHttpServerData>,
    query: web::Query<ListRequestsQuery>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let res = state
        .server
        .list_requests(query.into_inner().filter)
        .await
        .map_err(http_error);
    log_request(LOG_TARGET, "GET", "/approvals", 200, &res, start);
    Ok(web::Json(res?))
}

#[post("/redeliver/{client_id}")]
async fn redeliver(
    state: web::Data<ApproverHttpServerData>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let client_id = path.into_inner();
    let res = state
        .server
        .redeliver_decision(&client_id)
        .await
        .map_err(http_error);
    log_request(
        LOG_TARGET,
        "POST",
        &format!("/redeliver/{}", client_id),
        200,
        &res,
        start,
    );
    Ok(web::Json(res?))
}

#[get("/version")]
async fn version() -> impl Responder {
    web::Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

impl Deref for ApproverHttpServer {
    type Target = Server;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ApproverHttpServer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{
        http::{header::ContentType, StatusCode},
        test,
    };
    use async_trait::async_trait;

    use keyquorum_core::{async_trait, ApproverId};
    use keyquorum_entity::{approval_request, ballot::Decision, delivery::DeliveryStatus};
    use keyquorum_http::{DecisionResponse, TransportError, VoteRequest};
    use keyquorum_migration::testing::testdb;

    use crate::VoteForwarder;

    struct UnreachableCoordinator;

    #[async_trait]
    impl VoteForwarder for UnreachableCoordinator {
        async fn forward(
            &self,
            _callback_address: &str,
            _vote: &VoteRequest,
        ) -> Result<(), TransportError> {
            Err(TransportError::Timeout)
        }
    }

    async fn test_data() -> web::Data<ApproverHttpServerData> {
        let database = testdb().await.expect("Failed to setup testdb");
        web::Data::new(ApproverHttpServerData::new(Arc::new(ApprovalServer::new(
            ApproverId::from("http://approver-a:7100"),
            database,
            Arc::new(UnreachableCoordinator),
        ))))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header(ContentType::json())
            .set_payload(body.to_string())
    }

    #[actix_web::test]
    async fn test_approval_then_decision() {
        let app = test::init_service(
            App::new()
                .app_data(json_config())
                .app_data(test_data().await)
                .configure(configure),
        )
        .await;

        let notice = json!({
            "client_id": "c1",
            "content": "access request",
            "callback_address": "http://coordinator:7000",
        });
        let res = test::call_service(&app, post_json("/approval", notice.clone()).to_request()).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        // Re-delivery is acknowledged the same way
        let res = test::call_service(&app, post_json("/approval", notice).to_request()).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);

        let req = test::TestRequest::get()
            .uri("/approvals?type=pending")
            .to_request();
        let pending: Vec<approval_request::Model> =
            test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(pending.len(), 1);

        let res = test::call_service(
            &app,
            post_json("/decision", json!({"client_id": "c1", "decision": "no"})).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: DecisionResponse = test::read_body_json(res).await;
        assert_eq!(body.decision, Decision::Reject);
        assert_eq!(body.delivery.status, DeliveryStatus::Failed);
        assert_eq!(body.delivery.error.as_deref(), Some("timed out"));

        let res = test::call_service(
            &app,
            post_json("/decision", json!({"client_id": "c1", "decision": "yes"})).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri("/approvals?type=decided")
            .to_request();
        let decided: Vec<approval_request::Model> =
            test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(decided.len(), 1);
        assert_eq!(decided[0].decision, Some(Decision::Reject));

        let req = test::TestRequest::post().uri("/redeliver/c1").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: DecisionResponse = test::read_body_json(res).await;
        assert_eq!(body.delivery.status, DeliveryStatus::Failed);
    }

    #[actix_web::test]
    async fn test_decision_unknown_task() {
        let app = test::init_service(
            App::new()
                .app_data(json_config())
                .app_data(test_data().await)
                .configure(configure),
        )
        .await;
        let res = test::call_service(
            &app,
            post_json("/decision", json!({"client_id": "nope", "decision": "approve"}))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = test::call_service(
            &app,
            post_json("/decision", json!({"client_id": "nope", "decision": "maybe"}))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
