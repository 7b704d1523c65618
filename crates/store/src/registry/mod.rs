//! Exchange access: transport, authentication and the registry API.

pub mod auth;
pub mod client;
pub mod transport;

pub use auth::{AccessToken, CredentialProvider, Credentials, TokenStore};
pub use client::{AuthState, RegistryClient};
pub use transport::{
    FormPart, HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, ReqwestTransport,
    TransportError,
};
