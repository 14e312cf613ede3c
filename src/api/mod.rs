pub mod control;
pub mod metrics;
pub mod status;

pub use control::control_bot;
pub use metrics::get_metrics;
pub use status::{get_bot_status, get_logs, get_portfolio, get_trading_pairs};

use actix_web::{HttpResponse, Responder};

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy"
    }))
}
