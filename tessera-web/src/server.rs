//! Web 服务器模块
//!
//! 基于 Axum 的请求来源与结果执行器：查询字符串与表单参数转换为 [`ActionRequest`]，
//! 分派结果转换为 HTTP 响应。页面渲染不在本模块范围内，转发与回显以 JSON 视图数据返回。

use anyhow::Context as _;
use axum::body::Body;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::config::Environment;
use tessera_core::constants::{SERVER_ENABLE_REQUEST_LOGGING, SERVER_HOST, SERVER_PORT};
use tessera_validator::{LocalizationProvider, Locale, MapLocalizationProvider, ValidationErrors};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::dispatcher::{DispatchError, DispatchResult, Dispatcher};
use crate::outcome::{Outcome, StreamOutcome};
use crate::request::ActionRequest;

/// Web 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 是否启用请求日志
    pub enable_request_logging: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_request_logging: true,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            host: env.get_string_or(SERVER_HOST, &defaults.host),
            port: env
                .get_i64(SERVER_PORT)
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or(defaults.port),
            enable_request_logging: env
                .get_bool_or(SERVER_ENABLE_REQUEST_LOGGING, defaults.enable_request_logging),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
struct ServerState {
    dispatcher: Arc<Dispatcher>,
    messages: Arc<dyn LocalizationProvider>,
}

/// Tessera Web 服务器
pub struct ActionServer {
    dispatcher: Arc<Dispatcher>,
    properties: ServerProperties,
    messages: Arc<dyn LocalizationProvider>,
}

impl ActionServer {
    pub fn new(dispatcher: Dispatcher, properties: ServerProperties) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            properties,
            messages: Arc::new(MapLocalizationProvider::new()),
        }
    }

    /// 设置错误消息的本地化提供者
    pub fn with_localization(mut self, provider: impl LocalizationProvider + 'static) -> Self {
        self.messages = Arc::new(provider);
        self
    }

    pub fn properties(&self) -> &ServerProperties {
        &self.properties
    }

    /// 所有请求都进入分派器
    pub fn router(&self) -> Router {
        let state = ServerState {
            dispatcher: Arc::clone(&self.dispatcher),
            messages: Arc::clone(&self.messages),
        };

        let router = Router::new().fallback(handle_action).with_state(state);

        if self.properties.enable_request_logging {
            router.layer(TraceLayer::new_for_http())
        } else {
            router
        }
    }

    /// 启动服务器
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.properties.address();
        let app = self.router();

        tracing::info!("🚀 Starting Tessera Web Server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        tracing::info!("✅ Server listening on http://{}", addr);

        axum::serve(listener, app).await.context("Server error")?;

        Ok(())
    }
}

async fn handle_action(State(state): State<ServerState>, request: Request) -> Response {
    let uri = request.uri().clone();
    let path = uri.path().to_string();

    let mut pairs = match Query::<Vec<(String, String)>>::try_from_uri(&uri) {
        Ok(Query(pairs)) => pairs,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, &path, rejection.body_text());
        }
    };

    let locale = accept_language(request.headers());

    if request.method() != Method::GET && request.method() != Method::HEAD {
        match Form::<Vec<(String, String)>>::from_request(request, &state).await {
            Ok(Form(form)) => pairs.extend(form),
            Err(rejection) => {
                tracing::debug!(path = %path, error = %rejection, "Request body is not a form, ignoring");
            }
        }
    }

    let mut action_request = ActionRequest::from_pairs(path.clone(), pairs);
    if let Some(locale) = locale.clone() {
        action_request = action_request.locale(locale);
    }
    let locale =
        locale.unwrap_or_else(|| state.dispatcher.settings().default_locale.clone());

    let dispatcher = Arc::clone(&state.dispatcher);
    let dispatched =
        tokio::task::spawn_blocking(move || dispatcher.dispatch(&action_request)).await;

    match dispatched {
        Ok(Ok(result)) => execute(&state, &path, &locale, result),
        Ok(Err(error)) => dispatch_error_response(&path, &error),
        Err(join_error) => {
            tracing::error!(path = %path, error = %join_error, "Dispatch task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &path, join_error.to_string())
        }
    }
}

/// `Accept-Language` 中的第一个语言标签
fn accept_language(headers: &HeaderMap) -> Option<Locale> {
    let value = headers.get(header::ACCEPT_LANGUAGE)?.to_str().ok()?;
    let tag = value.split(',').next()?.split(';').next()?.trim();
    (!tag.is_empty() && tag != "*").then(|| Locale::parse(tag))
}

/// 结果执行器
fn execute(state: &ServerState, path: &str, locale: &Locale, result: DispatchResult) -> Response {
    let action_path = state
        .dispatcher
        .resolver()
        .binding_from_path(path)
        .map(str::to_string);
    let event = result.event().map(str::to_string);
    let bean = result.bean_snapshot();

    match result.into_outcome() {
        Outcome::Redirect(onward) => {
            let url = onward.url();
            match HeaderValue::from_str(&url) {
                Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
                Err(_) => error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    path,
                    format!("Invalid redirect target: {}", url),
                ),
            }
        }
        Outcome::Forward(onward) => Json(json!({
            "view": onward.url(),
            "event": event,
            "bean": bean.unwrap_or(Value::Null),
        }))
        .into_response(),
        Outcome::Stream(stream) => stream_response(&stream),
        Outcome::Redisplay(redisplay) => {
            let errors = render_errors(
                redisplay.errors(),
                locale,
                state.messages.as_ref(),
                action_path.as_deref(),
            );
            Json(json!({
                "view": redisplay.source_page(),
                "event": event,
                "errors": errors,
                "values": redisplay.values(),
            }))
            .into_response()
        }
    }
}

fn stream_response(stream: &StreamOutcome) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(content_type) = HeaderValue::from_str(stream.content_type()) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    if let Some(filename) = stream.filename() {
        let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
        if let Ok(disposition) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, disposition);
        }
    }
    (StatusCode::OK, headers, Body::from(stream.body().clone())).into_response()
}

/// 按字段渲染错误消息
pub fn render_errors(
    errors: &ValidationErrors,
    locale: &Locale,
    provider: &dyn LocalizationProvider,
    action_path: Option<&str>,
) -> BTreeMap<String, Vec<String>> {
    errors
        .iter()
        .map(|(field, list)| {
            let messages = list
                .iter()
                .map(|error| error.render(locale, provider, action_path))
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

fn dispatch_error_response(path: &str, error: &DispatchError) -> Response {
    let status = if error.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(status, path, error.root().to_string())
}

/// 标准错误响应格式
fn error_response(status: StatusCode, path: &str, message: String) -> Response {
    let body = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "status": status.as_u16(),
        "error": status.canonical_reason().unwrap_or("Unknown Error"),
        "message": message,
        "path": path,
    });
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionBeanBuilder, ValidationMethod};
    use crate::resolver::ActionResolver;
    use tessera_validator::ValidationError;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    #[derive(Debug, Default, crate::Bean)]
    struct Calculator {
        #[validate(required)]
        number_one: Option<f64>,
        #[validate(required)]
        number_two: Option<f64>,
        result: Option<f64>,
    }

    fn server() -> ActionServer {
        let definition = ActionBeanBuilder::<Calculator>::new("/Calculator.action")
            .default_handler("addition", |c: &mut Calculator, _| {
                c.result = Some(c.number_one.unwrap_or_default() + c.number_two.unwrap_or_default());
                Ok(Outcome::forward("/result.jsp"))
            })
            .handler("export", |c: &mut Calculator, _| {
                Ok(Outcome::stream("text/csv", format!("{:?}", c.number_one))
                    .with_filename("numbers.csv"))
            })
            .handler("save", |_: &mut Calculator, _| Ok(Outcome::redirect("/saved")))
            .validation_method(
                ValidationMethod::new("positive", |c: &Calculator, errors| {
                    if c.number_two.is_some_and(|n| n < 0.0) {
                        errors.add("numberTwo", ValidationError::simple("{0} must not be negative"));
                    }
                }),
            )
            .build();
        let resolver = ActionResolver::builder().register(definition).build().unwrap();
        let properties = ServerProperties {
            enable_request_logging: false,
            ..ServerProperties::default()
        };
        ActionServer::new(Dispatcher::new(Arc::new(resolver)), properties)
    }

    async fn send(request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = server().router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_forward_returns_view_and_bean() {
        let request = HttpRequest::builder()
            .uri("/Calculator.action?numberOne=3&numberTwo=4")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["view"], "/result.jsp");
        assert_eq!(json["event"], "addition");
        assert_eq!(json["bean"]["result"], 7.0);
    }

    #[tokio::test]
    async fn test_form_post_redirects() {
        let request = HttpRequest::builder()
            .method(Method::POST)
            .uri("/Calculator.action")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("numberOne=1&numberTwo=2&save=Save"))
            .unwrap();
        let (status, headers, _) = send(request).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "/saved");
    }

    #[tokio::test]
    async fn test_redisplay_renders_messages() {
        let request = HttpRequest::builder()
            .uri("/Calculator.action?numberOne=1%2C5&numberTwo=-2&_sourcePage=/index.jsp")
            .header(header::ACCEPT_LANGUAGE, "de-DE,de;q=0.9")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["view"], "/index.jsp");
        assert_eq!(json["errors"]["numberTwo"][0], "Number Two must not be negative");
        assert_eq!(json["values"]["numberOne"][0], "1,5");
    }

    #[tokio::test]
    async fn test_stream_sets_attachment() {
        let request = HttpRequest::builder()
            .uri("/Calculator.action/export?numberOne=2&numberTwo=1")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"numbers.csv\""
        );
        assert_eq!(body, b"Some(2.0)");
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let request = HttpRequest::builder()
            .uri("/Missing.action")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["path"], "/Missing.action");
    }

    #[test]
    fn test_server_properties_from_environment() {
        use tessera_core::config::{ConfigValue, MapPropertySource};

        let env = Environment::new().with_property_source(
            MapPropertySource::new("test").with_property(SERVER_PORT, ConfigValue::Int(9090)),
        );
        let properties = ServerProperties::from_environment(&env);
        assert_eq!(properties.address(), "0.0.0.0:9090");
        assert!(properties.enable_request_logging);
    }
}
