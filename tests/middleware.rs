use std::{cell::RefCell, io, rc::Rc};

use actix_web::{
    App, HttpRequest, HttpResponse,
    body::SizedStream,
    cookie::Cookie,
    http::StatusCode,
    test::{self, TestRequest},
    web,
};
use actix_web_middleware_taglog::{
    KeyTag, LocalsExt, TAG_BYTES_RECEIVED, TAG_BYTES_SENT, TAG_METHOD, TAG_REQ_BODY, TAG_REQ_BODY_STRING,
    TAG_REQ_HEADERS, TAG_REQ_HEADERS_STRING, TAG_RES_BODY, TAG_RES_BODY_STRING, TAG_RES_HEADERS,
    TAG_RES_HEADERS_STRING, TAG_ROUTE, TAG_STATUS, TagLogger, Tags, attach_key_tag,
};
use bytes::Bytes;
use futures_util::stream;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn logger(tags: &[&str], buf: &SharedBuf) -> TagLogger {
    TagLogger::new(tags.iter().copied().collect::<Tags>()).output(buf.clone())
}

#[actix_web::test]
async fn test_logger() {
    let buf = SharedBuf::default();
    let app = test::init_service(
        App::new()
            .wrap(logger(
                &[
                    TAG_METHOD,
                    TAG_STATUS,
                    &attach_key_tag(KeyTag::Locals, "loc"),
                    &attach_key_tag(KeyTag::ResHeader, "custom-header"),
                ],
                &buf,
            ))
            .route(
                "/",
                web::get().to(|req: HttpRequest| async move {
                    req.set_local("loc", "val");
                    HttpResponse::Ok()
                        .append_header(("custom-header", "custom-header-value"))
                        .body("random string")
                }),
            ),
    )
    .await;

    let res = test::call_service(&app, TestRequest::get().uri("/").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    test::read_body(res).await;

    let out = buf.contents();
    assert!(out.contains("method=GET"), "{out}");
    assert!(out.contains("status=200"), "{out}");
    assert!(out.contains("respHeader=custom-header-value"), "{out}");
    assert!(out.contains("locals=val"), "{out}");
    assert!(!out.contains("loc="), "{out}");
}

#[actix_web::test]
async fn test_string_logger() {
    let buf = SharedBuf::default();
    let app = test::init_service(
        App::new()
            .wrap(logger(
                &[
                    TAG_METHOD,
                    TAG_REQ_BODY,
                    TAG_REQ_BODY_STRING,
                    TAG_REQ_HEADERS,
                    TAG_REQ_HEADERS_STRING,
                    TAG_RES_BODY,
                    TAG_RES_BODY_STRING,
                    TAG_RES_HEADERS,
                    TAG_RES_HEADERS_STRING,
                ],
                &buf,
            ))
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Ok()
                        .append_header(("custom-response-header", "custom-response-header-value"))
                        .body("random string")
                }),
            ),
    )
    .await;

    let req = TestRequest::get()
        .uri("/")
        .insert_header(("custom-request-header", "custom-request-header-value"))
        .set_payload("number=2")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    test::read_body(res).await;

    let out = buf.contents();
    assert!(
        out.contains("custom-request-header=custom-request-header-value"),
        "{out}"
    );
    assert!(out.contains("reqBodyString=\"number=2\""), "{out}");
    assert!(
        out.contains("custom-response-header=custom-response-header-value"),
        "{out}"
    );
    assert!(out.contains("resBodyString=\"random string\""), "{out}");
}

#[actix_web::test]
async fn test_unknown_tag_is_ignored() {
    let buf = SharedBuf::default();
    let app = test::init_service(
        App::new()
            .wrap(logger(&[TAG_STATUS, "not-a-tag"], &buf))
            .route("/", web::get().to(|| async { "ok" })),
    )
    .await;

    let res = test::call_service(&app, TestRequest::get().uri("/").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    test::read_body(res).await;

    let out = buf.contents();
    assert!(out.ends_with("msg=\"access log\" status=200\n"), "{out}");
    assert!(!out.contains("not-a-tag"), "{out}");
}

#[actix_web::test]
async fn test_bytes_sent_for_streamed_and_sized_bodies() {
    let buf = SharedBuf::default();
    let app = test::init_service(
        App::new()
            .wrap(logger(&[TAG_BYTES_SENT], &buf))
            .route(
                "/streamed",
                web::get().to(|| async {
                    let chunks = stream::iter([
                        Ok::<_, actix_web::Error>(Bytes::from_static(b"random ")),
                        Ok(Bytes::from_static(b"string")),
                    ]);
                    HttpResponse::Ok().streaming(chunks)
                }),
            )
            .route(
                "/sized",
                web::get().to(|| async {
                    let chunks = stream::iter([
                        Ok::<_, actix_web::Error>(Bytes::from_static(b"random ")),
                        Ok(Bytes::from_static(b"string")),
                    ]);
                    HttpResponse::Ok().body(SizedStream::new(13, chunks))
                }),
            ),
    )
    .await;

    let body =
        test::call_and_read_body(&app, TestRequest::get().uri("/streamed").to_request()).await;
    assert_eq!(body, "random string");
    let body = test::call_and_read_body(&app, TestRequest::get().uri("/sized").to_request()).await;
    assert_eq!(body, "random string");

    let out = buf.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("bytesSent=0"), "{out}");
    assert!(lines[1].ends_with("bytesSent=13"), "{out}");
}

#[actix_web::test]
async fn test_route_query_form_and_cookie() {
    let buf = SharedBuf::default();
    let app = test::init_service(
        App::new()
            .wrap(logger(
                &[
                    TAG_ROUTE,
                    &attach_key_tag(KeyTag::Query, "page"),
                    &attach_key_tag(KeyTag::Form, "name"),
                    &attach_key_tag(KeyTag::Cookie, "session"),
                    &attach_key_tag(KeyTag::ReqHeader, "x-tenant"),
                ],
                &buf,
            ))
            .route(
                "/users/{id}",
                web::post().to(|form: web::Form<Vec<(String, String)>>| async move {
                    HttpResponse::Ok().body(form.into_inner().len().to_string())
                }),
            ),
    )
    .await;

    let req = TestRequest::post()
        .uri("/users/42?page=3")
        .insert_header(("content-type", "application/x-www-form-urlencoded"))
        .insert_header(("x-tenant", "acme"))
        .cookie(Cookie::new("session", "abc123"))
        .set_payload("name=alice+smith&age=30")
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "2");

    let out = buf.contents();
    assert!(out.contains("route=\"/users/{id}\""), "{out}");
    assert!(out.contains("query=3"), "{out}");
    assert!(out.contains("form=\"alice smith\""), "{out}");
    assert!(out.contains("cookie=abc123"), "{out}");
    assert!(out.contains("reqHeader=acme"), "{out}");
}

#[actix_web::test]
async fn test_form_reads_multipart_fields() {
    let buf = SharedBuf::default();
    let app = test::init_service(
        App::new()
            .wrap(logger(
                &[&attach_key_tag(KeyTag::Form, "name"), TAG_BYTES_RECEIVED],
                &buf,
            ))
            .route(
                "/upload",
                web::post().to(|body: Bytes| async move { HttpResponse::Ok().body(body) }),
            ),
    )
    .await;

    let payload = "--XX\r\n\
        Content-Disposition: form-data; name=\"avatar\"; filename=\"a.txt\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        file body\r\n\
        --XX\r\n\
        Content-Disposition: form-data; name=\"name\"\r\n\r\n\
        alice\r\n\
        --XX--\r\n";
    let req = TestRequest::post()
        .uri("/upload")
        .insert_header(("content-type", "multipart/form-data; boundary=XX"))
        .set_payload(payload)
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, payload);

    let out = buf.contents();
    assert!(out.contains("form=alice"), "{out}");
    assert!(
        out.ends_with(&format!("bytesReceived={}\n", payload.len())),
        "{out}"
    );
}

#[actix_web::test]
async fn test_large_body_reaches_handler_whole() {
    let buf = SharedBuf::default();
    let app = test::init_service(
        App::new()
            .wrap(logger(&[TAG_BYTES_RECEIVED, TAG_REQ_BODY_STRING], &buf).body_limit(16))
            .route(
                "/",
                web::post().to(|body: String| async move {
                    HttpResponse::Ok().body(body.len().to_string())
                }),
            ),
    )
    .await;

    let payload = "x".repeat(1024);
    let req = TestRequest::post()
        .uri("/")
        .set_payload(payload.clone())
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "1024");

    let out = buf.contents();
    assert!(
        out.ends_with(&format!("bytesReceived=1024 reqBodyString={}\n", &payload[..16])),
        "{out}"
    );
}

#[actix_web::test]
async fn test_each_request_gets_its_own_locals() {
    let buf = SharedBuf::default();
    let app = test::init_service(
        App::new()
            .wrap(logger(&[&attach_key_tag(KeyTag::Locals, "user")], &buf))
            .route(
                "/{user}",
                web::get().to(|req: HttpRequest, path: web::Path<String>| async move {
                    if path.as_str() != "anonymous" {
                        req.set_local("user", path.into_inner());
                    }
                    HttpResponse::NoContent().finish()
                }),
            ),
    )
    .await;

    for uri in ["/alice", "/anonymous", "/bob"] {
        let res = test::call_service(&app, TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    let out = buf.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("locals=alice"), "{out}");
    assert!(lines[1].ends_with("locals=null"), "{out}");
    assert!(lines[2].ends_with("locals=bob"), "{out}");
}
