use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::models::{BotStatus, Portfolio};
use crate::state::AppState;

pub async fn get_bot_status(data: web::Data<AppState>) -> impl Responder {
    let snapshot = data.reporter().snapshot();
    HttpResponse::Ok().json(BotStatus::from(&snapshot))
}

/// 引擎发布的交易对列表，原样返回；没有数据时返回空列表
pub async fn get_trading_pairs(data: web::Data<AppState>) -> impl Responder {
    let report = data.reporter().engine.load();
    match report.trading_pairs {
        Some(pairs @ serde_json::Value::Array(_)) => HttpResponse::Ok().json(pairs),
        _ => HttpResponse::Ok().json(Vec::<serde_json::Value>::new()),
    }
}

/// 引擎发布的组合数据，原样返回；没有数据时返回全零组合
pub async fn get_portfolio(data: web::Data<AppState>) -> impl Responder {
    let report = data.reporter().engine.load();
    match report.portfolio {
        Some(portfolio) => HttpResponse::Ok().json(portfolio),
        None => HttpResponse::Ok().json(Portfolio::default()),
    }
}

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn get_logs(data: web::Data<AppState>, query: web::Query<LogsQuery>) -> impl Responder {
    let limit = query.limit.min(1000);
    let logs = data.reporter().recent_logs(limit);
    HttpResponse::Ok().json(serde_json::json!({ "logs": logs }))
}
