use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::HeaderValue;
use http::Request as HttpRequest;
use http::Response as HttpResponse;
use http_body_util::combinators::UnsyncBoxBody;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tonic::Status;
use tower::{Layer, Service};

use crate::access::{Capabilities, Role};

/// Access token claims issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    pub exp: usize,
    #[serde(default)]
    pub aud: Option<String>,
}

/// Authenticated user info injected by the auth middleware into request extensions.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub capabilities: Capabilities,
}

/// Public paths that do not require JWT authentication
const PUBLIC_PATHS: &[&str] = &[
    "/portal.ouvidoria.OuvidoriaService/Submit",
    "/portal.ouvidoria.OuvidoriaService/Track",
    "/portal.ouvidoria.OuvidoriaService/Rate",
    "/portal.registrations.InterestRegistrationService/Register",
    "/portal.carousel.CarouselService/ListPublic",
    "/portal.archive.ArchiveService/RegisterView",
    "/grpc.health.v1.Health/Check",
    "/grpc.health.v1.Health/Watch",
    "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
    "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo",
];

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|p| path == *p)
}

#[derive(Clone)]
pub struct AuthLayer {
    pool: PgPool,
    jwt_secret: String,
    audience: String,
}

impl AuthLayer {
    pub fn new(pool: PgPool, jwt_secret: String, audience: String) -> Self {
        Self {
            pool,
            jwt_secret,
            audience,
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            pool: self.pool.clone(),
            jwt_secret: self.jwt_secret.clone(),
            audience: self.audience.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    pool: PgPool,
    jwt_secret: String,
    audience: String,
}

type BoxBody = UnsyncBoxBody<bytes::Bytes, Status>;

fn grpc_status_response(status: Status) -> HttpResponse<BoxBody> {
    let code = status.code() as i32;
    let message = status.message().to_string();

    let mut response = HttpResponse::new(UnsyncBoxBody::default());
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/grpc"),
    );
    response
        .headers_mut()
        .insert("grpc-status", HeaderValue::from(code));
    if !message.is_empty() {
        let encoded = urlencoding::encode(&message).into_owned();
        if let Ok(val) = HeaderValue::from_str(&encoded) {
            response.headers_mut().insert("grpc-message", val);
        }
    }
    response
}

pub fn decode_token(token: &str, secret: &str, audience: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| tracing::debug!("JWT rejected: {}", e))
        .ok()
}

impl<S, ReqBody> Service<HttpRequest<ReqBody>> for AuthMiddleware<S>
where
    S: Service<HttpRequest<ReqBody>, Response = HttpResponse<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = HttpResponse<BoxBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        let pool = self.pool.clone();
        let jwt_secret = self.jwt_secret.clone();
        let audience = self.audience.clone();

        Box::pin(async move {
            let path = req.uri().path().to_string();

            if is_public_path(&path) {
                return inner.call(req).await;
            }

            let claims = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .and_then(|token| decode_token(token, &jwt_secret, &audience));

            let Some(claims) = claims else {
                return Ok(grpc_status_response(Status::unauthenticated(
                    "Authentication required",
                )));
            };

            let capabilities = match load_capabilities(&pool, &claims.sub).await {
                Ok(caps) => caps,
                Err(e) => {
                    tracing::error!("Failed to load profile for {}: {}", claims.sub, e);
                    return Ok(grpc_status_response(Status::unavailable(
                        "Failed to load user profile",
                    )));
                }
            };

            tracing::debug!("{} {} as {}", path, claims.sub, capabilities.role);
            req.extensions_mut().insert(AuthenticatedUser {
                user_id: claims.sub,
                email: claims.email,
                capabilities,
            });

            inner.call(req).await
        })
    }
}

/// Users without a profile row get the plain `user` role.
async fn load_capabilities(pool: &PgPool, user_id: &str) -> Result<Capabilities, sqlx::Error> {
    let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT role, setor_id::text FROM profiles WHERE user_id = $1::uuid",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        Some((role, setor_id)) => Capabilities::new(Role::from_profile(role.as_deref()), setor_id),
        None => Capabilities::new(Role::User, None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(aud: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: "6a1f".into(),
            email: "ana@chipindo.gov.ao".into(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            aud: Some(aud.into()),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"segredo")).unwrap()
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/portal.ouvidoria.OuvidoriaService/Submit"));
        assert!(is_public_path("/grpc.health.v1.Health/Check"));
        assert!(!is_public_path("/portal.ouvidoria.OuvidoriaService/List"));
        assert!(!is_public_path("/portal.users.UserService/Me"));
    }

    #[test]
    fn test_decode_token() {
        let claims = decode_token(&token("authenticated", 3600), "segredo", "authenticated").unwrap();
        assert_eq!(claims.sub, "6a1f");
        assert_eq!(claims.email, "ana@chipindo.gov.ao");
    }

    #[test]
    fn test_decode_token_rejects() {
        assert!(decode_token(&token("authenticated", 3600), "outro", "authenticated").is_none());
        assert!(decode_token(&token("anon", 3600), "segredo", "authenticated").is_none());
        assert!(decode_token(&token("authenticated", -3600), "segredo", "authenticated").is_none());
        assert!(decode_token("not-a-jwt", "segredo", "authenticated").is_none());
    }

    #[test]
    fn test_status_response_headers() {
        let response = grpc_status_response(Status::unauthenticated("Sem sessão"));
        assert_eq!(response.headers()["grpc-status"], "16");
        assert_eq!(response.headers()["grpc-message"], "Sem%20sess%C3%A3o");
    }
}
