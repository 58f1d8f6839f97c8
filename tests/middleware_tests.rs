use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::Body,
    extract::Request,
    http::{StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use switchyard::{
    Handler, Middleware, RouteError,
    middleware::{cache, disable_cache, panic_recovery},
    wrap_middlewares,
};

// --- Helpers ---

async fn run(middleware: &Middleware, handler: Handler) -> Response {
    middleware.wrap(handler).run(Request::new(Body::empty())).await
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// --- Composition ---

#[tokio::test]
async fn test_wrap_order_puts_the_first_middleware_outside() {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let recording = |name: &'static str| {
        let log = log.clone();
        Middleware::from_fn(move |request: Request, next: Handler| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{name} pre"));
                let response = next.run(request).await;
                log.lock().unwrap().push(format!("{name} post"));
                response
            }
        })
    };

    let handler_log = log.clone();
    let handler = Handler::from_fn(move |_req: Request| {
        let log = handler_log.clone();
        async move {
            log.lock().unwrap().push("handler".to_string());
            "ok"
        }
    });

    let chain = vec![recording("A"), recording("B")];
    wrap_middlewares(&chain, handler)
        .run(Request::new(Body::empty()))
        .await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["A pre", "B pre", "handler", "B post", "A post"]
    );
}

#[tokio::test]
async fn test_empty_chain_is_identity() {
    let handler = Handler::from_fn(|_req: Request| async { "plain" });
    let response = wrap_middlewares(&[], handler)
        .run(Request::new(Body::empty()))
        .await;
    assert_eq!(body_string(response).await, "plain");
}

// --- Cache policies ---

#[tokio::test]
async fn test_cache_marks_successful_responses() {
    let policy = cache(Duration::from_secs(60));

    let plain = Handler::from_fn(|_req: Request| async { "shared" });
    let response = run(&policy, plain).await;
    assert_eq!(response.headers()[CACHE_CONTROL], "public, max-age=60");

    let own = Handler::from_fn(|_req: Request| async {
        ([(CACHE_CONTROL, "private")], "mine").into_response()
    });
    let response = run(&policy, own).await;
    assert_eq!(response.headers()[CACHE_CONTROL], "private");
}

#[tokio::test]
async fn test_cache_leaves_errors_and_redirects_alone() {
    let policy = cache(Duration::from_secs(60));

    let missing = Handler::from_fn(|_req: Request| async { RouteError::not_found() });
    let response = run(&policy, missing).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!response.headers().contains_key(CACHE_CONTROL));

    let moved = Handler::from_fn(|_req: Request| async {
        axum::response::Redirect::temporary("/elsewhere")
    });
    let response = run(&policy, moved).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(!response.headers().contains_key(CACHE_CONTROL));
}

#[tokio::test]
async fn test_disable_cache_overrides_handlers() {
    let handler = Handler::from_fn(|_req: Request| async {
        ([(CACHE_CONTROL, "public, max-age=600")], "asset").into_response()
    });
    let response = run(&disable_cache(), handler).await;
    assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
}

// --- Panic recovery ---

#[tokio::test]
async fn test_panics_become_route_errors() {
    let handler = Handler::from_fn(|_req: Request| async {
        if true {
            panic!("kaboom");
        }
        "unreachable"
    });

    let response = run(&panic_recovery(), handler).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let rerr: RouteError = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(rerr.info["errors"], serde_json::json!(["kaboom"]));
}
