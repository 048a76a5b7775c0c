use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::cliente_repo::ClienteRepo,
    db::solicitacao_repo::{AoMudarPendentes, Assinatura, MudancaStatus, SolicitacaoRepo},
    models::solicitacao::{FiltroSolicitacoes, NovaSolicitacao, Solicitacao, StatusSolicitacao},
    services::notificacoes::Notificador,
    stores::GuiaCarregando,
};

/// Store das solicitações de coleta.
pub struct SolicitacoesStore {
    repo: Arc<dyn SolicitacaoRepo>,
    clientes: Arc<dyn ClienteRepo>,
    notificador: Arc<Notificador>,
    lista: RwLock<Vec<Solicitacao>>,
    carregando: AtomicBool,
}

impl SolicitacoesStore {
    pub fn new(
        repo: Arc<dyn SolicitacaoRepo>,
        clientes: Arc<dyn ClienteRepo>,
        notificador: Arc<Notificador>,
    ) -> Self {
        Self {
            repo,
            clientes,
            notificador,
            lista: RwLock::new(Vec::new()),
            carregando: AtomicBool::new(false),
        }
    }

    pub fn solicitacoes(&self) -> Vec<Solicitacao> {
        self.lista.read().expect("lock envenenado").clone()
    }

    pub fn carregando(&self) -> bool {
        self.carregando.load(Ordering::SeqCst)
    }

    pub async fn buscar_solicitacoes(
        &self,
        filtro: &FiltroSolicitacoes,
    ) -> Result<(), AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        let lista = self.repo.listar(filtro).await.map_err(|e| {
            tracing::error!("Erro ao buscar solicitações: {e}");
            e
        })?;
        *self.lista.write().expect("lock envenenado") = lista;
        Ok(())
    }

    pub async fn obter_solicitacao(&self, id: Uuid) -> Result<Option<Solicitacao>, AppError> {
        self.repo.buscar_por_id(id).await.map_err(|e| {
            tracing::error!("Erro ao buscar solicitação: {e}");
            e
        })
    }

    /// Registra o pedido do cliente e faz o fan-out do aviso para os admins,
    /// um envio por vez; um erro no meio aborta os envios restantes.
    pub async fn criar_solicitacao(&self, dados: NovaSolicitacao) -> Result<Uuid, AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        dados.validate()?;

        let solicitacao = Solicitacao {
            id: Uuid::new_v4(),
            cliente_id: dados.cliente_id,
            cliente_nome: dados.cliente_nome,
            percentual: dados.percentual,
            status: StatusSolicitacao::Pendente,
            data_solicitacao: Utc::now(),
            data_agendamento: None,
            data_conclusao: None,
            coleta_id: None,
            atualizado_em: None,
        };
        self.repo.inserir(&solicitacao).await.map_err(|e| {
            tracing::error!("Erro ao criar solicitação: {e}");
            e
        })?;

        let admins = self.clientes.listar_admins().await?;
        self.notificador
            .notificar_admins_nova_solicitacao(&admins, &solicitacao)
            .await?;

        self.buscar_solicitacoes(&FiltroSolicitacoes::default())
            .await?;
        Ok(solicitacao.id)
    }

    /// Avança o status. As transições são monotônicas: nada reabre.
    /// `agendada` carimba o agendamento e avisa o cliente; `concluida`
    /// carimba a conclusão e guarda o vínculo com a coleta, quando houver.
    pub async fn atualizar_status(
        &self,
        id: Uuid,
        novo: StatusSolicitacao,
        coleta_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let atual = self
            .repo
            .buscar_por_id(id)
            .await?
            .ok_or(AppError::NaoEncontrado)?;

        if !atual.status.pode_avancar_para(novo) {
            return Err(AppError::TransicaoInvalida {
                de: atual.status.as_str().to_owned(),
                para: novo.as_str().to_owned(),
            });
        }

        let agora = Utc::now();
        let mudanca = MudancaStatus {
            status: novo,
            data_agendamento: (novo == StatusSolicitacao::Agendada).then_some(agora),
            data_conclusao: (novo == StatusSolicitacao::Concluida).then_some(agora),
            coleta_id: if novo == StatusSolicitacao::Concluida {
                coleta_id
            } else {
                None
            },
        };
        self.repo.atualizar_status(id, &mudanca).await.map_err(|e| {
            tracing::error!("Erro ao atualizar status da solicitação: {e}");
            e
        })?;

        if novo == StatusSolicitacao::Agendada {
            self.notificador
                .notificar_coleta_agendada(atual.cliente_id, id)
                .await?;
        }

        self.buscar_solicitacoes(&FiltroSolicitacoes::default())
            .await
    }

    /// Abre a consulta ao vivo das pendentes. O handle devolvido pertence ao
    /// chamador; além do callback, cada entrega atualiza a lista em cache.
    pub async fn assinar_pendentes(
        self: &Arc<Self>,
        callback: impl Fn(Vec<Solicitacao>) + Send + Sync + 'static,
    ) -> Result<Assinatura, AppError> {
        let fraco = Arc::downgrade(self);
        let embrulho: AoMudarPendentes = Arc::new(move |lista: Vec<Solicitacao>| {
            if let Some(store) = fraco.upgrade() {
                *store.lista.write().expect("lock envenenado") = lista.clone();
            }
            callback(lista);
        });
        self.repo.assinar_pendentes(embrulho).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mem::MemDb;
    use std::sync::Mutex;
    use std::time::Duration;

    fn montar() -> (Arc<SolicitacoesStore>, Arc<MemDb>) {
        let db = Arc::new(MemDb::new());
        let notificador = Arc::new(Notificador::new(None, db.clone()));
        let store = Arc::new(SolicitacoesStore::new(db.clone(), db.clone(), notificador));
        (store, db)
    }

    fn nova(cliente_id: Uuid, percentual: i32) -> NovaSolicitacao {
        NovaSolicitacao {
            cliente_id,
            cliente_nome: "Ana".into(),
            percentual,
        }
    }

    #[tokio::test]
    async fn criar_entra_pendente_e_lista() {
        let (store, _db) = montar();
        let id = store
            .criar_solicitacao(nova(Uuid::new_v4(), 80))
            .await
            .unwrap();

        let lista = store.solicitacoes();
        assert_eq!(lista.len(), 1);
        assert_eq!(lista[0].id, id);
        assert_eq!(lista[0].status, StatusSolicitacao::Pendente);
        assert!(lista[0].data_agendamento.is_none());
    }

    #[tokio::test]
    async fn percentual_fora_da_faixa_e_rejeitado() {
        let (store, _db) = montar();
        let erro = store
            .criar_solicitacao(nova(Uuid::new_v4(), 120))
            .await
            .unwrap_err();
        assert!(matches!(erro, AppError::Validacao(_)));
    }

    #[tokio::test]
    async fn agendar_carimba_e_preserva_o_resto() {
        let (store, _db) = montar();
        let id = store
            .criar_solicitacao(nova(Uuid::new_v4(), 70))
            .await
            .unwrap();
        let antes = store.obter_solicitacao(id).await.unwrap().unwrap();

        store
            .atualizar_status(id, StatusSolicitacao::Agendada, None)
            .await
            .unwrap();

        let depois = store.obter_solicitacao(id).await.unwrap().unwrap();
        assert_eq!(depois.status, StatusSolicitacao::Agendada);
        assert!(depois.data_agendamento.is_some());
        assert!(depois.data_conclusao.is_none());
        // Só status e carimbos mudam.
        assert_eq!(depois.cliente_id, antes.cliente_id);
        assert_eq!(depois.percentual, antes.percentual);
        assert_eq!(depois.data_solicitacao, antes.data_solicitacao);
    }

    #[tokio::test]
    async fn concluir_guarda_o_vinculo_com_a_coleta() {
        let (store, _db) = montar();
        let id = store
            .criar_solicitacao(nova(Uuid::new_v4(), 70))
            .await
            .unwrap();
        store
            .atualizar_status(id, StatusSolicitacao::Agendada, None)
            .await
            .unwrap();

        let coleta_id = Uuid::new_v4();
        store
            .atualizar_status(id, StatusSolicitacao::Concluida, Some(coleta_id))
            .await
            .unwrap();

        let depois = store.obter_solicitacao(id).await.unwrap().unwrap();
        assert_eq!(depois.status, StatusSolicitacao::Concluida);
        assert!(depois.data_conclusao.is_some());
        assert_eq!(depois.coleta_id, Some(coleta_id));
    }

    #[tokio::test]
    async fn nada_reabre() {
        let (store, _db) = montar();
        let id = store
            .criar_solicitacao(nova(Uuid::new_v4(), 70))
            .await
            .unwrap();
        store
            .atualizar_status(id, StatusSolicitacao::Concluida, None)
            .await
            .unwrap();

        let erro = store
            .atualizar_status(id, StatusSolicitacao::Agendada, None)
            .await
            .unwrap_err();
        assert!(matches!(erro, AppError::TransicaoInvalida { .. }));

        let depois = store.obter_solicitacao(id).await.unwrap().unwrap();
        assert_eq!(depois.status, StatusSolicitacao::Concluida);
    }

    #[tokio::test]
    async fn filtro_por_status_e_limite() {
        let (store, _db) = montar();
        for pct in [10, 20, 30] {
            store
                .criar_solicitacao(nova(Uuid::new_v4(), pct))
                .await
                .unwrap();
        }
        let primeira = store.solicitacoes().last().unwrap().id;
        store
            .atualizar_status(primeira, StatusSolicitacao::Cancelada, None)
            .await
            .unwrap();

        store
            .buscar_solicitacoes(&FiltroSolicitacoes {
                status: Some(StatusSolicitacao::Pendente),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.solicitacoes().len(), 2);

        store
            .buscar_solicitacoes(&FiltroSolicitacoes {
                status: Some(StatusSolicitacao::Pendente),
                limite: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.solicitacoes().len(), 1);
    }

    #[tokio::test]
    async fn consulta_ao_vivo_entrega_e_encerra() {
        let (store, _db) = montar();
        let entregas: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let entregas_cb = entregas.clone();
        let assinatura = store
            .assinar_pendentes(move |lista| {
                entregas_cb.lock().unwrap().push(lista.len());
            })
            .await
            .unwrap();

        // Entrega inicial (lista vazia).
        assert_eq!(entregas.lock().unwrap().first().copied(), Some(0));

        store
            .criar_solicitacao(nova(Uuid::new_v4(), 50))
            .await
            .unwrap();
        for _ in 0..100 {
            if entregas.lock().unwrap().iter().any(|n| *n == 1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(entregas.lock().unwrap().iter().any(|n| *n == 1));

        // Depois de encerrar, nada mais chega.
        assinatura.encerrar();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let antes = entregas.lock().unwrap().len();
        store
            .criar_solicitacao(nova(Uuid::new_v4(), 60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(entregas.lock().unwrap().len(), antes);
    }
}
