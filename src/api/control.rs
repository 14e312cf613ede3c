use actix_web::{web, HttpResponse, Responder};

use crate::state::AppState;

/// POST /api/bot/{start|stop|restart}
///
/// 在阻塞线程池里执行，状态接口不会被正在进行的 start/stop 卡住。
/// 只返回确认，前端之后自行轮询状态。
pub async fn control_bot(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let action = path.into_inner();
    if !matches!(action.as_str(), "start" | "stop" | "restart") {
        return HttpResponse::NotFound().json(serde_json::json!({
            "success": false,
            "message": "",
            "error": format!("unknown action '{}'", action)
        }));
    }

    let settings = data.settings.clone();
    let op = action.clone();
    let result = web::block(move || {
        let controller = settings.controller();
        let message = match op.as_str() {
            "start" => controller.start().map(|o| o.to_string()),
            "stop" => controller.stop().map(|o| o.to_string()),
            _ => controller.restart().map(|o| o.to_string()),
        };
        (message, controller.state())
    })
    .await;

    match result {
        Ok((Ok(message), state)) => {
            log::info!("🌐 API {}: {} [{}]", action, message, state);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": message,
                "error": ""
            }))
        }
        Ok((Err(e), state)) => {
            log::error!("🌐 API {} failed [{}] ({}): {}", action, state, e.as_label(), e);
            HttpResponse::Ok().json(serde_json::json!({
                "success": false,
                "message": "",
                "error": e.to_string()
            }))
        }
        Err(e) => {
            log::error!("🌐 API {} aborted: {}", action, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "success": false,
                "message": "",
                "error": e.to_string()
            }))
        }
    }
}
