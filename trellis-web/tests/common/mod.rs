#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use axum::{body::Body, extract::Request, response::Response};
use http::Method;
use trellis_core::{MemoryStore, TransactionCoordinator};
use trellis_web::{
    AuthMiddleware, Dispatcher, FileBodyMiddleware, RouteTableBuilder, TokenAuthenticator,
};

pub const TOKEN: &str = "test-token";

/// 收集日志输出，供断言使用
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 为当前线程安装捕获日志的订阅者；`#[tokio::test]` 默认单线程，派生的任务也会被捕获
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (capture, tracing::subscriber::set_default(subscriber))
}

/// 配置了认证与文件阶段的构建器
pub fn routes() -> RouteTableBuilder {
    RouteTableBuilder::new()
        .with_auth(Arc::new(AuthMiddleware::new(Arc::new(
            TokenAuthenticator::new([TOKEN]),
        ))))
        .with_file_body(Arc::new(FileBodyMiddleware::default()))
}

pub fn dispatcher(routes: RouteTableBuilder, store: &MemoryStore) -> Dispatcher {
    Dispatcher::new(
        Arc::new(routes.build().unwrap()),
        TransactionCoordinator::new(Arc::new(store.clone())),
    )
}

/// 携带有效凭据的请求
pub fn request(method: Method, uri: &str) -> http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", TOKEN)
}

pub fn empty(method: Method, uri: &str) -> Request {
    request(method, uri).body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
