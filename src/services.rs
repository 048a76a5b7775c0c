pub mod auth;
pub use auth::{AuthProvider, MemAuth, PgAuth};
pub mod notificacoes;
pub use notificacoes::{Notificador, OneSignalGateway, PushGateway, SdkPush};
