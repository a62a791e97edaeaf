use std::{error::Error, ops::Deref, ops::DerefMut, sync::Arc};

use actix_web::{
    dev::Server, get, http::header::ContentType, post, web, App, HttpResponse, HttpServer,
    Responder,
};
use tokio::time::Instant;

use keyquorum_core::{actix_web, anyhow, tokio};
use keyquorum_encryption::{Cipher, EnvelopeContainer};
use keyquorum_http::{
    http_error, log_request, HttpError, ReleaseRequest, ReleaseResponse, SealQuery,
    VersionResponse,
};

use crate::{EnvelopeService, KeyReleaseGate, ReleaseDenied};

const LOG_TARGET: &str = "keyquorum_gate::http";
const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

pub struct GateHttpServer {
    inner: Server,
}

#[derive(Clone)]
pub struct GateHttpServerData {
    gate: Arc<KeyReleaseGate>,
    envelopes: Arc<EnvelopeService>,
}

impl GateHttpServerData {
    pub fn new(gate: Arc<KeyReleaseGate>, envelopes: Arc<EnvelopeService>) -> Self {
        GateHttpServerData { gate, envelopes }
    }
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1024 * 1024)
        .error_handler(|err, _req| HttpError::BadRequest(err.to_string()).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| HttpError::BadRequest(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(release).service(seal).service(version);
}

/// Release denials first, then the shared protocol errors
fn gate_error(err: anyhow::Error) -> HttpError {
    match err.downcast::<ReleaseDenied>() {
        Ok(denied) => denied.into(),
        Err(err) => http_error(err),
    }
}

impl GateHttpServer {
    pub async fn new(
        gate: Arc<KeyReleaseGate>,
        envelopes: Arc<EnvelopeService>,
        http_addr: &str,
    ) -> anyhow::Result<Self> {
        let data = web::Data::new(GateHttpServerData::new(gate, envelopes));
        let inner = HttpServer::new(move || {
            App::new()
                .app_data(json_config())
                .app_data(query_config())
                .app_data(web::PayloadConfig::new(MAX_PAYLOAD_LEN))
                .app_data(data.clone())
                .configure(configure)
        })
        .system_exit()
        .disable_signals()
        .shutdown_timeout(0)
        .bind(http_addr)?
        .run();

        Ok(GateHttpServer { inner })
    }

    pub async fn listen(self) -> Result<(), Box<dyn Error>> {
        Ok(self.inner.await?)
    }
}

#[post("/release")]
async fn release(
    state: web::Data<GateHttpServerData>,
    req: web::Json<ReleaseRequest>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let res = state
        .gate
        .release_key(&req.client_id, &req.wrapped_key, &req.key_id)
        .await
        .map(|dek| ReleaseResponse {
            dek: dek.to_base64().to_string(),
        })
        .map_err(gate_error);
    log_request(LOG_TARGET, "POST", "/release", 200, &res, start);
    Ok(web::Json(res?))
}

#[post("/envelope/seal")]
async fn seal(
    state: web::Data<GateHttpServerData>,
    query: web::Query<SealQuery>,
    payload: web::Bytes,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let query = query.into_inner();
    let res = seal_archive(
        &state.envelopes,
        &query.key_name,
        query.cipher.unwrap_or_default(),
        &payload,
    )
    .await
    .map_err(http_error);
    log_request(LOG_TARGET, "POST", "/envelope/seal", 200, &res, start);
    Ok(HttpResponse::Ok()
        .content_type(ContentType::octet_stream())
        .body(res?))
}

async fn seal_archive(
    envelopes: &EnvelopeService,
    key_name: &str,
    cipher: Cipher,
    payload: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let container: EnvelopeContainer = envelopes.seal(key_name, cipher, payload, None).await?;
    container.to_archive()
}

#[get("/version")]
async fn version() -> impl Responder {
    web::Json(VersionResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

impl Deref for GateHttpServer {
    type Target = Server;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for GateHttpServer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use serde_json::json;

    use keyquorum_coordinator::{
        ApprovalPolicy, ApprovalStore, DatabaseApprovalStore, NewTask,
    };
    use keyquorum_core::{serde_json, ApproverId};
    use keyquorum_entity::ballot::Decision;
    use keyquorum_kms::{CustodianKms, KeyManagementClient, PlaintextKey, WrappedKey};
    use keyquorum_migration::testing::testdb;

    use crate::{open_container, StoreOutcomeSource};

    struct Fixture {
        data: web::Data<GateHttpServerData>,
        store: Arc<DatabaseApprovalStore>,
        kms: Arc<CustodianKms>,
    }

    async fn fixture() -> Fixture {
        let database = testdb().await.expect("Failed to setup testdb");
        let store = Arc::new(DatabaseApprovalStore::new(database.clone()));
        let kms = Arc::new(
            CustodianKms::new(b"an example very very secret key.".to_vec(), database)
                .expect("Invalid CustodianKms"),
        );
        let gate = KeyReleaseGate::new(
            Arc::new(StoreOutcomeSource::new(store.clone())),
            kms.clone(),
        );
        Fixture {
            data: web::Data::new(GateHttpServerData::new(
                Arc::new(gate),
                Arc::new(EnvelopeService::new(kms.clone())),
            )),
            store,
            kms,
        }
    }

    async fn create_task(store: &DatabaseApprovalStore, client_id: &str) {
        store
            .create_task(NewTask {
                client_id: client_id.to_string(),
                content: "access request".to_string(),
                callback_address: "http://coordinator:7000".to_string(),
                approvers: vec![ApproverId::from("A")],
                policy: ApprovalPolicy::Unanimous,
            })
            .await
            .expect("Failed to create task");
    }

    fn release_request(client_id: &str, wrapped: &WrappedKey) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/release")
            .insert_header(ContentType::json())
            .set_payload(
                json!({
                    "client_id": client_id,
                    "wrapped_key": wrapped.to_base64(),
                    "key_id": "reports",
                })
                .to_string(),
            )
    }

    #[actix_web::test]
    async fn test_seal_and_release() {
        let f = fixture().await;
        let app = test::init_service(
            App::new()
                .app_data(json_config())
                .app_data(query_config())
                .app_data(f.data.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/envelope/seal?key_name=reports&cipher=chacha20-poly1305")
            .insert_header(ContentType::octet_stream())
            .set_payload("quarterly figures")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        let archive = test::read_body(res).await;
        let container = EnvelopeContainer::from_archive(&archive).expect("Invalid archive");
        assert_eq!(container.key_id, "reports");
        assert_eq!(container.cipher, Cipher::ChaCha20Poly1305);
        let wrapped = WrappedKey::from(container.wrapped_key.clone());

        let res = test::call_service(&app, release_request("c1", &wrapped).to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        create_task(&f.store, "c1").await;
        let res = test::call_service(&app, release_request("c1", &wrapped).to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "Rejected");

        f.store
            .apply_vote("c1", &ApproverId::from("A"), Decision::Approve)
            .await
            .expect("Failed to vote");
        let res = test::call_service(&app, release_request("c1", &wrapped).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: ReleaseResponse = test::read_body_json(res).await;
        let dek = PlaintextKey::from(
            WrappedKey::from_base64(&body.dek)
                .expect("Invalid base64")
                .into_vec(),
        );
        assert_eq!(
            open_container(&container, &dek).expect("Failed to open"),
            b"quarterly figures"
        );

        let direct = f
            .kms
            .unwrap("reports", &wrapped)
            .await
            .expect("Failed to unwrap");
        assert_eq!(direct.as_bytes(), dek.as_bytes());
    }

    #[actix_web::test]
    async fn test_rejected_task_and_bad_requests() {
        let f = fixture().await;
        let app = test::init_service(
            App::new()
                .app_data(json_config())
                .app_data(query_config())
                .app_data(f.data.clone())
                .configure(configure),
        )
        .await;

        create_task(&f.store, "c2").await;
        f.store
            .apply_vote("c2", &ApproverId::from("A"), Decision::Reject)
            .await
            .expect("Failed to vote");
        let wrapped = WrappedKey::from(vec![1u8; 60]);
        let res = test::call_service(&app, release_request("c2", &wrapped).to_request()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/release")
            .insert_header(ContentType::json())
            .set_payload(
                json!({"client_id": "c2", "wrapped_key": "not base64!", "key_id": "reports"})
                    .to_string(),
            )
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/envelope/seal?cipher=rot13")
            .set_payload("x")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/version").to_request();
        let body: VersionResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.name, "keyquorum-gate");
    }
}
