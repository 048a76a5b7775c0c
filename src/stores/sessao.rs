//! Guarda de sessão: identidade autenticada + perfil carregado + flag de
//! carregamento. A guarda assina o fluxo de estado do provedor de
//! autenticação uma única vez e segue assinada pela vida do processo
//! (política contínua; a tarefa segura só um `Weak`, então derrubar a guarda
//! encerra a assinatura).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

use crate::{
    common::error::AppError,
    db::cliente_repo::ClienteRepo,
    models::auth::AuthUser,
    models::cliente::{Cliente, TipoUsuario},
    services::auth::AuthProvider,
    services::notificacoes::SdkPush,
};

#[derive(Default)]
struct Sessao {
    usuario: Option<AuthUser>,
    perfil: Option<Cliente>,
}

pub struct SessaoStore {
    auth: Arc<dyn AuthProvider>,
    perfis: Arc<dyn ClienteRepo>,
    push: Arc<SdkPush>,
    sessao: RwLock<Sessao>,
    carregando_tx: watch::Sender<bool>,
    inicializada: AtomicBool,
}

impl SessaoStore {
    pub fn new(auth: Arc<dyn AuthProvider>, perfis: Arc<dyn ClienteRepo>, push: Arc<SdkPush>) -> Self {
        let (carregando_tx, _) = watch::channel(true);
        Self {
            auth,
            perfis,
            push,
            sessao: RwLock::new(Sessao::default()),
            carregando_tx,
            inicializada: AtomicBool::new(false),
        }
    }

    pub fn usuario(&self) -> Option<AuthUser> {
        self.sessao.read().expect("lock envenenado").usuario.clone()
    }

    pub fn perfil(&self) -> Option<Cliente> {
        self.sessao.read().expect("lock envenenado").perfil.clone()
    }

    pub fn carregando(&self) -> bool {
        *self.carregando_tx.borrow()
    }

    /// Bloqueia até a primeira resolução do estado de autenticação.
    pub async fn aguardar_pronto(&self) {
        let mut rx = self.carregando_tx.subscribe();
        // O sender mora em self, então o canal não fecha enquanto a guarda vive.
        let _ = rx.wait_for(|carregando| !carregando).await;
    }

    /// Assina o fluxo de estado do provedor. Idempotente: a segunda chamada
    /// apenas espera a primeira resolução. Retorna depois que o primeiro
    /// evento foi aplicado (com ou sem perfil carregado).
    pub async fn inicializar(self: &Arc<Self>) {
        if !self.inicializada.swap(true, Ordering::SeqCst) {
            let mut rx = self.auth.estado();
            let guarda = Arc::downgrade(self);
            tokio::spawn(async move {
                loop {
                    let atual = rx.borrow_and_update().clone();
                    let Some(store) = guarda.upgrade() else { break };
                    store.aplicar_estado(atual).await;
                    store.carregando_tx.send_replace(false);
                    drop(store);
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            });
        }
        self.aguardar_pronto().await;
    }

    async fn aplicar_estado(&self, usuario: Option<AuthUser>) {
        match usuario {
            Some(usuario) => {
                let perfil = match self.perfis.buscar_por_id(usuario.uid).await {
                    Ok(perfil) => perfil,
                    Err(e) => {
                        tracing::error!("Erro ao carregar perfil: {e}");
                        None
                    }
                };
                let mut sessao = self.sessao.write().expect("lock envenenado");
                sessao.usuario = Some(usuario);
                sessao.perfil = perfil;
            }
            None => {
                let mut sessao = self.sessao.write().expect("lock envenenado");
                sessao.usuario = None;
                sessao.perfil = None;
            }
        }
    }

    /// Login do painel. Só perfis admin passam: perfil ausente ou de outro
    /// tipo derruba a sessão recém-criada e devolve o erro de domínio.
    pub async fn entrar(&self, email: &str, senha: &str) -> Result<(), AppError> {
        let usuario = self.auth.entrar(email, senha).await.map_err(|e| {
            tracing::error!("Erro no login: {e}");
            e
        })?;

        let perfil = self.perfis.buscar_por_id(usuario.uid).await?;
        let Some(perfil) = perfil else {
            self.sair().await?;
            return Err(AppError::PerfilNaoEncontrado);
        };
        if perfil.tipo != TipoUsuario::Admin {
            let tipo = perfil.tipo.as_str().to_owned();
            self.sair().await?;
            return Err(AppError::AcessoNegado(tipo));
        }

        {
            let mut sessao = self.sessao.write().expect("lock envenenado");
            sessao.usuario = Some(usuario.clone());
            sessao.perfil = Some(perfil);
        }

        // Registra o admin como destinatário de push desta sessão.
        self.push.vincular(usuario.uid.to_string());
        tracing::info!("Login de admin: {}", usuario.email);
        Ok(())
    }

    pub async fn sair(&self) -> Result<(), AppError> {
        self.push.desvincular();
        self.auth.sair().await?;
        let mut sessao = self.sessao.write().expect("lock envenenado");
        sessao.usuario = None;
        sessao.perfil = None;
        Ok(())
    }

    /// Delega ao fluxo fora de banda do provedor; erros sobem sem tradução.
    pub async fn redefinir_senha(&self, email: &str) -> Result<(), AppError> {
        self.auth.redefinir_senha(email).await.map_err(|e| {
            tracing::error!("Erro ao enviar e-mail de recuperação: {e}");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mem::MemDb;
    use crate::services::auth::MemAuth;
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn perfil(id: Uuid, tipo: TipoUsuario) -> Cliente {
        Cliente {
            id,
            email: "alguem@sucata.com".into(),
            nome: "Alguém".into(),
            tipo,
            cpf_cnpj: String::new(),
            endereco: String::new(),
            telefone: String::new(),
            ativo: true,
            notificacoes: Vec::new(),
            criado_em: Utc::now(),
            atualizado_em: None,
        }
    }

    struct Cenario {
        auth: Arc<MemAuth>,
        db: Arc<MemDb>,
        push: Arc<SdkPush>,
        store: Arc<SessaoStore>,
    }

    fn cenario() -> Cenario {
        let auth = Arc::new(MemAuth::new());
        let db = Arc::new(MemDb::new());
        let push = Arc::new(SdkPush::new());
        push.pronto();
        let store = Arc::new(SessaoStore::new(auth.clone(), db.clone(), push.clone()));
        Cenario { auth, db, push, store }
    }

    async fn cadastrar_com_perfil(c: &Cenario, tipo: TipoUsuario) -> AuthUser {
        let usuario = c
            .auth
            .cadastrar("alguem@sucata.com", "123456")
            .await
            .unwrap();
        let perfis: Arc<dyn ClienteRepo> = c.db.clone();
        perfis.inserir(&perfil(usuario.uid, tipo)).await.unwrap();
        usuario
    }

    #[tokio::test]
    async fn inicializar_resolve_sem_usuario() {
        let c = cenario();
        assert!(c.store.carregando());
        c.store.inicializar().await;
        assert!(!c.store.carregando());
        assert!(c.store.usuario().is_none());
        assert!(c.store.perfil().is_none());
    }

    #[tokio::test]
    async fn login_de_admin_carrega_perfil_e_vincula_push() {
        let c = cenario();
        c.store.inicializar().await;
        let usuario = cadastrar_com_perfil(&c, TipoUsuario::Admin).await;

        c.store.entrar("alguem@sucata.com", "123456").await.unwrap();

        assert_eq!(c.store.usuario().unwrap().uid, usuario.uid);
        assert_eq!(c.store.perfil().unwrap().tipo, TipoUsuario::Admin);
        assert_eq!(c.push.vinculado(), Some(usuario.uid.to_string()));
    }

    #[tokio::test]
    async fn login_de_nao_admin_rejeita_e_derruba_sessao() {
        let c = cenario();
        c.store.inicializar().await;
        cadastrar_com_perfil(&c, TipoUsuario::Cliente).await;

        let erro = c
            .store
            .entrar("alguem@sucata.com", "123456")
            .await
            .unwrap_err();
        assert!(matches!(erro, AppError::AcessoNegado(tipo) if tipo == "cliente"));

        // O logout forçado não deixa sessão parcialmente autenticada.
        assert!(c.store.usuario().is_none());
        assert!(c.store.perfil().is_none());
        assert!(c.auth.estado().borrow().is_none());
        assert_eq!(c.push.vinculado(), None);
    }

    #[tokio::test]
    async fn login_sem_perfil_rejeita() {
        let c = cenario();
        c.store.inicializar().await;
        // Credencial sem documento de perfil correspondente.
        c.auth.cadastrar("alguem@sucata.com", "123456").await.unwrap();

        let erro = c
            .store
            .entrar("alguem@sucata.com", "123456")
            .await
            .unwrap_err();
        assert!(matches!(erro, AppError::PerfilNaoEncontrado));
        assert!(c.store.usuario().is_none());
    }

    #[tokio::test]
    async fn assinatura_continua_acompanha_o_provedor() {
        let c = cenario();
        c.store.inicializar().await;
        let usuario = cadastrar_com_perfil(&c, TipoUsuario::Admin).await;

        // O provedor restaura uma sessão por fora; a guarda acompanha.
        c.auth.publicar_estado(Some(usuario.clone()));
        for _ in 0..100 {
            if c.store.usuario().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(c.store.usuario().unwrap().uid, usuario.uid);
        assert_eq!(c.store.perfil().unwrap().id, usuario.uid);

        c.auth.publicar_estado(None);
        for _ in 0..100 {
            if c.store.usuario().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(c.store.usuario().is_none());
    }
}
