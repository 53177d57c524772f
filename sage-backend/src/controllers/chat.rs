//! Direct model chat: the caller supplies the transcript, no agent loop,
//! no memory.

use actix_web::{web, HttpResponse, Responder};

use crate::ai::{CompletionModel, Message, MessageRole};
use crate::models::{ChatRequest, ChatResponse, ErrorResponse};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/chat").route(web::post().to(chat)));
}

async fn chat(state: web::Data<AppState>, body: web::Json<ChatRequest>) -> impl Responder {
    let mut messages = Vec::new();

    if let Some(system_prompt) = &body.system_prompt {
        messages.push(Message::system(system_prompt));
    }

    for msg in &body.messages {
        let role = match msg.role.as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            other => {
                return HttpResponse::BadRequest().json(ErrorResponse::new(format!(
                    "Unknown message role '{}'",
                    other
                )));
            }
        };
        messages.push(Message {
            role,
            content: msg.content.clone(),
        });
    }

    let model = match state.completion_model(body.temperature, body.max_tokens) {
        Ok(m) => m,
        Err(e) => {
            log::error!("Failed to create completion model: {}", e);
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::new(format!("Error processing chat: {}", e)));
        }
    };

    match model.generate_text(messages).await {
        Ok(response) => HttpResponse::Ok().json(ChatResponse {
            response,
            model: model.model_name().to_string(),
        }),
        Err(e) => {
            log::error!("Chat generation failed: {}", e);
            let body = ErrorResponse::new(format!("Error processing chat: {}", e));
            if e.is_client_error() {
                // The provider rejected the request itself (bad model name,
                // oversized max_tokens, ...)
                HttpResponse::BadRequest().json(body)
            } else {
                HttpResponse::InternalServerError().json(body)
            }
        }
    }
}
