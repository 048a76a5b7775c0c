use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identidade emitida pelo provedor de autenticação. O `uid` é a chave do
/// perfil correspondente na coleção `users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: Uuid,
    pub email: String,
}
