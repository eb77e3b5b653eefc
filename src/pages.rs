//! Server rendered pages.
use actix_web::http::header::ContentType;
use actix_web::{get, HttpResponse};


const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Home</title>
</head>
<body>
    <main>
        <h1>Welcome</h1>
        <p>This page is under construction. Check back soon.</p>
    </main>
</body>
</html>
"#;


/// Renders the home page. It takes no input and can't fail.
pub fn render_home() -> String {
    HOME_PAGE.to_string()
}


#[get("/")]
pub async fn home() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(render_home())
}


#[cfg(test)]
mod tests {

    use super::*;
    use actix_web::{body, test::TestRequest, App};
    use actix_web::test::{init_service, call_service};

    #[test]
    fn test_render_home() {
        let page = render_home();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<h1>Welcome</h1>"));
        assert!(page.contains("under construction"));
    }

    #[actix_web::test]
    async fn test_home_handler() {
        let app = init_service(App::new().service(home)).await;
        let req = TestRequest::get().uri("/").to_request();

        let resp = call_service(&app, req).await;
        assert_eq!("200", resp.status().as_str());
        assert_eq!(resp.headers().get("content-type").unwrap(), "text/html; charset=utf-8");

        let body = body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), render_home());
    }
}
