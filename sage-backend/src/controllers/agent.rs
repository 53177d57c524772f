//! Agent endpoints: session chat, one-shot research, and the decomposition
//! pipeline. Agents are constructed per request; only what the storage
//! adapter holds survives past the response.

use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use uuid::Uuid;

use crate::agent::{chat_agent, research_agent};
use crate::error::AgentError;
use crate::models::{AgentRequest, AgentResponse, ErrorResponse};
use crate::pipeline::DecompositionPipeline;
use crate::tools::{create_default_tools, Tool};
use crate::vector::VectorRetriever;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/agent/chat").route(web::post().to(chat_agentically)))
        .service(web::resource("/api/agent/research").route(web::post().to(research)))
        .service(web::resource("/api/agent/research/deep").route(web::post().to(research_deep)));
}

/// Retriever (if configured) plus the ordered default tool set for one request
fn request_tools(
    state: &AppState,
    namespace: Option<String>,
) -> (Vec<Arc<dyn Tool>>, Option<Arc<dyn VectorRetriever>>) {
    let retriever = state.retriever(namespace);
    let tools = create_default_tools(&state.http, retriever.clone());
    (tools, retriever)
}

fn execution_error(e: AgentError) -> HttpResponse {
    let body = ErrorResponse::new(format!("Error in agent execution: {}", e));
    // A provider-side outage reads as a bad gateway, everything else as a
    // generic execution failure
    match &e {
        AgentError::Completion(ai) if ai.is_server_error() => {
            HttpResponse::BadGateway().json(body)
        }
        _ => HttpResponse::InternalServerError().json(body),
    }
}

async fn chat_agentically(state: web::Data<AppState>, body: web::Json<AgentRequest>) -> impl Responder {
    let execution_id = Uuid::new_v4();
    log::info!(
        "[AGENT] execution {} starting (session: {:?})",
        execution_id,
        body.session_id
    );

    // Serialize turns per session so concurrent writers cannot clobber the
    // persisted history
    let _lane_guard = match &body.session_id {
        Some(session_id) => Some(state.lanes.acquire(session_id).await),
        None => None,
    };

    let llm = match state.completion_model(body.temperature, body.max_tokens) {
        Ok(m) => m,
        Err(e) => return execution_error(e),
    };

    let (tools, retriever) = request_tools(&state, body.namespace.clone());

    let agent = chat_agent(
        llm,
        tools,
        retriever,
        body.session_id.as_deref(),
        Some(state.storage.clone()),
        body.max_iterations,
    )
    .await;

    match agent.run(&body.query).await {
        Ok(result) => {
            log::info!("[AGENT] execution {} finished", execution_id);
            HttpResponse::Ok().json(AgentResponse {
                response: result.output,
            })
        }
        Err(e) => {
            log::error!("[AGENT] execution {} failed: {}", execution_id, e);
            execution_error(e)
        }
    }
}

async fn research(state: web::Data<AppState>, body: web::Json<AgentRequest>) -> impl Responder {
    let llm = match state.completion_model(body.temperature, body.max_tokens) {
        Ok(m) => m,
        Err(e) => return execution_error(e),
    };

    let (tools, _retriever) = request_tools(&state, body.namespace.clone());
    let agent = research_agent(llm, tools, body.max_iterations);

    match agent.run(&body.query).await {
        Ok(result) => HttpResponse::Ok().json(AgentResponse {
            response: result.output,
        }),
        Err(e) => {
            log::error!("[AGENT] research run failed: {}", e);
            execution_error(e)
        }
    }
}

async fn research_deep(state: web::Data<AppState>, body: web::Json<AgentRequest>) -> impl Responder {
    let llm = match state.completion_model(body.temperature, body.max_tokens) {
        Ok(m) => m,
        Err(e) => return execution_error(e),
    };

    // Each sub-question gets a fresh, isolated research agent
    let factory_state = state.clone();
    let namespace = body.namespace.clone();
    let max_iterations = body.max_iterations;
    let factory_llm = llm.clone();
    let pipeline = DecompositionPipeline::new(
        llm,
        Box::new(move || {
            let (tools, _retriever) = request_tools(&factory_state, namespace.clone());
            research_agent(factory_llm.clone(), tools, max_iterations)
        }),
    );

    match pipeline.arun(&body.query).await {
        Ok(result) => HttpResponse::Ok().json(AgentResponse {
            response: result.final_answer,
        }),
        Err(e) => {
            log::error!("[PIPELINE] deep research failed: {}", e);
            execution_error(e)
        }
    }
}
