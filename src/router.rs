//! Autorização de navegação do painel. Cada rota declara o que exige e a
//! guarda decide antes da troca de tela, sempre depois da primeira resolução
//! da sessão — a decisão nunca olha um estado de autenticação ainda em
//! carregamento.

use std::sync::Arc;

use crate::{models::cliente::TipoUsuario, stores::sessao::SessaoStore};

/// Exigências declaradas na rota. Exigir admin já implica exigir
/// autenticação.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotaMeta {
    pub requer_auth: bool,
    pub requer_guest: bool,
    pub requer_admin: bool,
}

impl RotaMeta {
    pub fn autenticada() -> Self {
        Self {
            requer_auth: true,
            ..Self::default()
        }
    }

    pub fn convidado() -> Self {
        Self {
            requer_guest: true,
            ..Self::default()
        }
    }

    pub fn admin() -> Self {
        Self {
            requer_admin: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decisao {
    Permitir,
    RedirecionarLogin,
    RedirecionarPainel,
}

/// Decide a navegação para uma rota.
///
/// Ordem das regras: falta de autenticação manda para o login; usuário
/// autenticado não entra em rota de convidado; autenticado sem perfil admin
/// em rota de admin volta para o login (não para o painel — ele não tem
/// acesso ao painel).
pub async fn antes_de_cada(sessao: &Arc<SessaoStore>, meta: RotaMeta) -> Decisao {
    sessao.aguardar_pronto().await;

    let usuario = sessao.usuario();
    if (meta.requer_auth || meta.requer_admin) && usuario.is_none() {
        return Decisao::RedirecionarLogin;
    }
    if meta.requer_guest && usuario.is_some() {
        return Decisao::RedirecionarPainel;
    }
    if meta.requer_admin {
        let e_admin = sessao
            .perfil()
            .is_some_and(|perfil| perfil.tipo == TipoUsuario::Admin);
        if !e_admin {
            return Decisao::RedirecionarLogin;
        }
    }
    Decisao::Permitir
}
