use std::{error::Error, ops::Deref, ops::DerefMut, sync::Arc};

use actix_web::{dev::Server, get, post, web, App, HttpResponse, HttpServer, Responder};
use tokio::time::Instant;

use keyquorum_core::{actix_web, anyhow, tokio};
use keyquorum_http::{
    http_error, log_request, HttpError, StartApprovalRequest, VersionResponse, VoteRequest,
};

use crate::Coordinator;

const LOG_TARGET: &str = "keyquorum_coordinator::http";

pub struct CoordinatorHttpServer {
    inner: Server,
}

#[derive(Clone)]
pub struct CoordinatorHttpServerData {
    coordinator: Arc<Coordinator>,
}

impl CoordinatorHttpServerData {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        CoordinatorHttpServerData { coordinator }
    }
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1024 * 1024)
        .error_handler(|err, _req| HttpError::BadRequest(err.to_string()).into())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(start_approval)
        .service(vote)
        .service(outcome)
        .service(deliveries)
        .service(redeliver)
        .service(version);
}

impl CoordinatorHttpServer {
    pub async fn new(coordinator: Arc<Coordinator>, http_addr: &str) -> anyhow::Result<Self> {
        let data = web::Data::new(CoordinatorHttpServerData::new(coordinator));
        let inner = HttpServer::new(move || {
            App::new()
                .app_data(json_config())
                .app_data(data.clone())
                .configure(configure)
        })
        .system_exit()
        .disable_signals()
        .shutdown_timeout(0)
        .bind(http_addr)?
        .run();

        Ok(CoordinatorHttpServer { inner })
    }

    pub async fn listen(self) -> Result<(), Box<dyn Error>> {
        Ok(self.inner.await?)
    }
}

#[post("/start_approval")]
async fn start_approval(
    state: web::Data<CoordinatorHttpServerData>,
    req: web::Json<StartApprovalRequest>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let res = state
        .coordinator
        .start_approval(req.into_inner())
        .await
        .map_err(http_error);
    log_request(LOG_TARGET, "POST", "/start_approval", 202, &res, start);
    Ok(HttpResponse::Accepted().json(res?))
}

#[post("/vote")]
async fn vote(
    state: web::Data<CoordinatorHttpServerData>,
    req: web::Json<VoteRequest>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let res = state
        .coordinator
        .receive_vote(req.into_inner())
        .await
        .map_err(http_error);
    log_request(LOG_TARGET, "POST", "/vote", 200, &res, start);
    Ok(web::Json(res?))
}

#[get("/outcome/{client_id}")]
async fn outcome(
    state: web::Data<CoordinatorHttpServerData>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let client_id = path.into_inner();
    let res = state
        .coordinator
        .get_outcome(&client_id)
        .await
        .map_err(http_error);
    log_request(
        LOG_TARGET,
        "GET",
        &format!("/outcome/{}", client_id),
        200,
        &res,
        start,
    );
    Ok(web::Json(res?))
}

#[get("/deliveries/{client_id}")]
async fn deliveries(
    state: web::Data<CoordinatorHttpServerData>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let client_id = path.into_inner();
    let res = state
        .coordinator
        .list_deliveries(&client_id)
        .await
        .map_err(http_error);
    log_request(
        LOG_TARGET,
        "GET",
        &format!("/deliveries/{}", client_id),
        200,
        &res,
        start,
    );
    Ok(web::Json(res?))
}

#[post("/redeliver/{client_id}")]
async fn redeliver(
    state: web::Data<CoordinatorHttpServerData>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let start = Instant::now();
    let client_id = path.into_inner();
    let res = state
        .coordinator
        .redeliver(&client_id)
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

impl Deref for CoordinatorHttpServer {
    type Target = Server;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for CoordinatorHttpServer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
