use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

// Mapeia o CREATE TYPE tipo_usuario do banco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tipo_usuario", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TipoUsuario {
    Admin,
    Cliente,
}

impl TipoUsuario {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipoUsuario::Admin => "admin",
            TipoUsuario::Cliente => "cliente",
        }
    }
}

/// Uma entrada do histórico de notificações embutido no perfil.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notificacao {
    pub titulo: String,
    pub mensagem: String,
    pub dados: Value,
    pub enviada_em: DateTime<Utc>,
    pub lida: bool,
}

/// Perfil na coleção `users`. O `id` é sempre o uid emitido pelo provedor de
/// autenticação na criação da credencial, nunca um id gerado à parte.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cliente {
    pub id: Uuid,
    pub email: String,
    pub nome: String,
    pub tipo: TipoUsuario,
    pub cpf_cnpj: String,
    pub endereco: String,
    pub telefone: String,
    pub ativo: bool,
    pub notificacoes: Vec<Notificacao>,
    pub criado_em: DateTime<Utc>,
    pub atualizado_em: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NovoCliente {
    #[validate(email(message = "E-mail inválido"))]
    pub email: String,
    #[validate(length(min = 6, message = "A senha precisa de pelo menos 6 caracteres"))]
    pub senha: String,
    #[validate(length(min = 1, message = "O nome é obrigatório"))]
    pub nome: String,
    pub cpf_cnpj: Option<String>,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
}

/// Patch parcial do perfil; campos ausentes ficam como estão.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtualizaCliente {
    pub nome: Option<String>,
    pub cpf_cnpj: Option<String>,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
}
