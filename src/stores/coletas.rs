use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::coleta_repo::ColetaRepo,
    models::coleta::{Coleta, FiltroColetas, NovaColeta, Periodo, StatusPagamento, TotalMaterial},
    models::solicitacao::StatusSolicitacao,
    services::notificacoes::Notificador,
    stores::solicitacoes::SolicitacoesStore,
    stores::GuiaCarregando,
};

/// Store dos registros de coleta.
pub struct ColetasStore {
    repo: Arc<dyn ColetaRepo>,
    solicitacoes: Arc<SolicitacoesStore>,
    notificador: Arc<Notificador>,
    lista: RwLock<Vec<Coleta>>,
    carregando: AtomicBool,
}

impl ColetasStore {
    pub fn new(
        repo: Arc<dyn ColetaRepo>,
        solicitacoes: Arc<SolicitacoesStore>,
        notificador: Arc<Notificador>,
    ) -> Self {
        Self {
            repo,
            solicitacoes,
            notificador,
            lista: RwLock::new(Vec::new()),
            carregando: AtomicBool::new(false),
        }
    }

    pub fn coletas(&self) -> Vec<Coleta> {
        self.lista.read().expect("lock envenenado").clone()
    }

    pub fn carregando(&self) -> bool {
        self.carregando.load(Ordering::SeqCst)
    }

    pub async fn buscar_coletas(&self, filtro: &FiltroColetas) -> Result<(), AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        let lista = self.repo.listar(filtro).await.map_err(|e| {
            tracing::error!("Erro ao buscar coletas: {e}");
            e
        })?;
        *self.lista.write().expect("lock envenenado") = lista;
        Ok(())
    }

    pub async fn obter_coleta(&self, id: Uuid) -> Result<Option<Coleta>, AppError> {
        self.repo.buscar_por_id(id).await.map_err(|e| {
            tracing::error!("Erro ao buscar coleta: {e}");
            e
        })
    }

    /// Registra uma coleta realizada. Os totais de cada linha e o valor da
    /// coleta são sempre recalculados aqui; pagamento nasce pendente. Quando a
    /// coleta atende a uma solicitação, a solicitação é concluída e vinculada,
    /// e o cliente recebe o aviso com o valor.
    pub async fn criar_coleta(&self, dados: NovaColeta) -> Result<Uuid, AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        dados.validate()?;

        let materiais: Vec<_> = dados.materiais.iter().map(|l| l.calcular()).collect();
        let valor_total: Decimal = materiais.iter().map(|l| l.valor_total).sum();

        let coleta = Coleta {
            id: Uuid::new_v4(),
            cliente_id: dados.cliente_id,
            coletor_id: dados.coletor_id,
            data_coleta: dados.data_coleta.unwrap_or_else(Utc::now),
            recipiente: dados.recipiente,
            materiais,
            valor_total,
            status_pagamento: StatusPagamento::Pendente,
            data_pagamento: None,
            solicitacao_id: dados.solicitacao_id,
            criado_em: Utc::now(),
            atualizado_em: None,
        };
        self.repo.inserir(&coleta).await.map_err(|e| {
            tracing::error!("Erro ao criar coleta: {e}");
            e
        })?;

        if let Some(solicitacao_id) = coleta.solicitacao_id {
            self.solicitacoes
                .atualizar_status(solicitacao_id, StatusSolicitacao::Concluida, Some(coleta.id))
                .await?;
        }
        self.notificador
            .notificar_coleta_concluida(coleta.cliente_id, &coleta)
            .await?;

        self.buscar_coletas(&FiltroColetas::default()).await?;
        Ok(coleta.id)
    }

    pub async fn atualizar_status_pagamento(
        &self,
        id: Uuid,
        status: StatusPagamento,
    ) -> Result<(), AppError> {
        let _guia = GuiaCarregando::ligar(&self.carregando);
        // Só o pagamento efetivado ganha carimbo; voltar para pendente o apaga.
        let data_pagamento = (status == StatusPagamento::Pago).then(Utc::now);
        self.repo
            .atualizar_pagamento(id, status, data_pagamento)
            .await
            .map_err(|e| {
                tracing::error!("Erro ao atualizar pagamento: {e}");
                e
            })?;
        self.buscar_coletas(&FiltroColetas::default()).await
    }

    /// Consulta direta por período, sem mexer na lista em cache.
    pub async fn coletas_por_periodo(&self, periodo: Periodo) -> Result<Vec<Coleta>, AppError> {
        self.repo
            .listar(&FiltroColetas {
                periodo: Some(periodo),
                ..Default::default()
            })
            .await
            .map_err(|e| {
                tracing::error!("Erro ao buscar coletas por período: {e}");
                e
            })
    }

    /// Agrega a lista em cache por nome de material: peso líquido somado,
    /// valor somado e em quantas coletas o material apareceu.
    pub fn total_por_material(&self) -> HashMap<String, TotalMaterial> {
        let lista = self.lista.read().expect("lock envenenado");
        let mut totais: HashMap<String, TotalMaterial> = HashMap::new();
        for coleta in lista.iter() {
            for linha in &coleta.materiais {
                let total = totais.entry(linha.nome_material.clone()).or_default();
                total.peso += linha.peso_liquido;
                total.valor += linha.valor_total;
                total.quantidade += 1;
            }
        }
        totais
    }
}
