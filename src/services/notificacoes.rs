//! Disparo de notificações push e histórico por destinatário.
//!
//! O envio em si vai para a API REST do OneSignal, endereçado pelo external
//! id do destinatário (o uid do perfil). Toda tentativa de envio com gateway
//! configurado anexa uma entrada ao histórico persistido no perfil — mesmo
//! quando o push falha; falha ao gravar o histórico é logada e engolida, por
//! ser contabilidade de melhor esforço.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::cliente_repo::ClienteRepo,
    models::cliente::Notificacao,
    models::coleta::Coleta,
    models::solicitacao::Solicitacao,
};

const ONESIGNAL_URL: &str = "https://onesignal.com/api/v1/notifications";

/// Seam do envio push endereçado por external id.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn enviar(
        &self,
        external_id: &str,
        titulo: &str,
        mensagem: &str,
        dados: &Value,
    ) -> Result<(), AppError>;
}

/// Gateway REST do OneSignal: app id + chave REST num header Authorization,
/// textos em inglês e português.
pub struct OneSignalGateway {
    http: reqwest::Client,
    app_id: String,
    rest_api_key: String,
}

impl OneSignalGateway {
    pub fn new(app_id: String, rest_api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            app_id,
            rest_api_key,
        }
    }
}

#[async_trait]
impl PushGateway for OneSignalGateway {
    async fn enviar(
        &self,
        external_id: &str,
        titulo: &str,
        mensagem: &str,
        dados: &Value,
    ) -> Result<(), AppError> {
        let corpo = json!({
            "app_id": self.app_id,
            "include_external_user_ids": [external_id],
            "headings": { "en": titulo, "pt": titulo },
            "contents": { "en": mensagem, "pt": mensagem },
            "data": dados,
        });

        let resposta = self
            .http
            .post(ONESIGNAL_URL)
            .header(AUTHORIZATION, format!("Basic {}", self.rest_api_key))
            .json(&corpo)
            .send()
            .await?;

        if !resposta.status().is_success() {
            return Err(AppError::EnvioPush(format!(
                "OneSignal respondeu {}",
                resposta.status()
            )));
        }
        Ok(())
    }
}

/// Vínculo do external id com a sessão do navegador. O SDK da página carrega
/// de forma assíncrona, então o cliente guarda as operações pedidas antes de
/// [`SdkPush::pronto`] e as aplica em ordem quando o SDK responde.
pub struct SdkPush {
    interno: Mutex<EstadoSdk>,
}

struct EstadoSdk {
    pronto: bool,
    fila: Vec<OperacaoSdk>,
    vinculado: Option<String>,
}

enum OperacaoSdk {
    Vincular(String),
    Desvincular,
}

impl SdkPush {
    pub fn new() -> Self {
        Self {
            interno: Mutex::new(EstadoSdk {
                pronto: false,
                fila: Vec::new(),
                vinculado: None,
            }),
        }
    }

    /// Marca o SDK como carregado e drena a fila na ordem de chegada.
    pub fn pronto(&self) {
        let mut estado = self.interno.lock().expect("lock envenenado");
        estado.pronto = true;
        let fila = std::mem::take(&mut estado.fila);
        for operacao in fila {
            aplicar(&mut estado, operacao);
        }
    }

    pub fn vincular(&self, external_id: String) {
        let mut estado = self.interno.lock().expect("lock envenenado");
        if estado.pronto {
            aplicar(&mut estado, OperacaoSdk::Vincular(external_id));
        } else {
            estado.fila.push(OperacaoSdk::Vincular(external_id));
        }
    }

    pub fn desvincular(&self) {
        let mut estado = self.interno.lock().expect("lock envenenado");
        if estado.pronto {
            aplicar(&mut estado, OperacaoSdk::Desvincular);
        } else {
            estado.fila.push(OperacaoSdk::Desvincular);
        }
    }

    pub fn vinculado(&self) -> Option<String> {
        self.interno.lock().expect("lock envenenado").vinculado.clone()
    }
}

fn aplicar(estado: &mut EstadoSdk, operacao: OperacaoSdk) {
    match operacao {
        OperacaoSdk::Vincular(id) => {
            tracing::debug!("External id vinculado: {id}");
            estado.vinculado = Some(id);
        }
        OperacaoSdk::Desvincular => {
            tracing::debug!("External id desvinculado");
            estado.vinculado = None;
        }
    }
}

impl Default for SdkPush {
    fn default() -> Self {
        Self::new()
    }
}

/// O despachante. Sem gateway configurado (segredos do OneSignal ausentes no
/// ambiente) todo envio vira warning e no-op; o resto do painel segue de pé.
pub struct Notificador {
    gateway: Option<Arc<dyn PushGateway>>,
    clientes: Arc<dyn ClienteRepo>,
}

impl Notificador {
    pub fn new(gateway: Option<Arc<dyn PushGateway>>, clientes: Arc<dyn ClienteRepo>) -> Self {
        if gateway.is_none() {
            tracing::warn!("OneSignal não configurado; notificações push desabilitadas");
        }
        Self { gateway, clientes }
    }

    /// Envia um push e anexa a entrada ao histórico do destinatário. O
    /// histórico é gravado mesmo quando o push falha; o erro do push é o que
    /// propaga.
    pub async fn enviar(
        &self,
        destinatario: Uuid,
        titulo: &str,
        mensagem: &str,
        dados: Value,
    ) -> Result<(), AppError> {
        let Some(gateway) = &self.gateway else {
            tracing::warn!("OneSignal não configurado; notificação \"{titulo}\" descartada");
            return Ok(());
        };

        let resultado = gateway
            .enviar(&destinatario.to_string(), titulo, mensagem, &dados)
            .await;

        let entrada = Notificacao {
            titulo: titulo.to_owned(),
            mensagem: mensagem.to_owned(),
            dados,
            enviada_em: Utc::now(),
            lida: false,
        };
        if let Err(e) = self.clientes.anexar_notificacao(destinatario, &entrada).await {
            tracing::error!("Erro ao salvar notificação no histórico: {e}");
        }

        if let Err(e) = &resultado {
            tracing::error!("Erro ao enviar notificação: {e}");
        }
        resultado
    }

    /// Avisa o cliente que a coleta foi agendada.
    pub async fn notificar_coleta_agendada(
        &self,
        cliente_id: Uuid,
        solicitacao_id: Uuid,
    ) -> Result<(), AppError> {
        self.enviar(
            cliente_id,
            "Coleta Agendada",
            "Sua coleta foi agendada para breve. Tenha o recipiente pronto!",
            json!({ "type": "collection_scheduled", "solicitacaoId": solicitacao_id }),
        )
        .await
    }

    /// Avisa o cliente que a coleta foi realizada, com o valor formatado.
    pub async fn notificar_coleta_concluida(
        &self,
        cliente_id: Uuid,
        coleta: &Coleta,
    ) -> Result<(), AppError> {
        self.enviar(
            cliente_id,
            "Coleta Concluída",
            &format!("Coleta realizada! Valor: R$ {:.2}", coleta.valor_total),
            json!({
                "type": "collection_completed",
                "coletaId": coleta.id,
                "valor": coleta.valor_total,
            }),
        )
        .await
    }

    /// Fan-out da nova solicitação para os admins, um envio por vez. Um erro
    /// propaga e aborta os envios restantes.
    pub async fn notificar_admins_nova_solicitacao(
        &self,
        admin_ids: &[Uuid],
        solicitacao: &Solicitacao,
    ) -> Result<(), AppError> {
        for admin_id in admin_ids {
            self.enviar(
                *admin_id,
                "Nova Solicitação de Coleta",
                &format!(
                    "{} solicitou uma coleta - {}%",
                    solicitacao.cliente_nome, solicitacao.percentual
                ),
                json!({ "type": "new_request", "solicitacaoId": solicitacao.id }),
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mem::MemDb;
    use crate::models::cliente::{Cliente, TipoUsuario};
    use crate::models::solicitacao::StatusSolicitacao;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Gateway de teste: registra os envios e falha a partir de um índice.
    struct GatewayTeste {
        envios: Mutex<Vec<String>>,
        falhar_no: Option<usize>,
        contagem: AtomicUsize,
    }

    impl GatewayTeste {
        fn novo(falhar_no: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                envios: Mutex::new(Vec::new()),
                falhar_no,
                contagem: AtomicUsize::new(0),
            })
        }

        fn destinos(&self) -> Vec<String> {
            self.envios.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushGateway for GatewayTeste {
        async fn enviar(
            &self,
            external_id: &str,
            _titulo: &str,
            _mensagem: &str,
            _dados: &Value,
        ) -> Result<(), AppError> {
            let n = self.contagem.fetch_add(1, Ordering::SeqCst) + 1;
            self.envios.lock().unwrap().push(external_id.to_owned());
            if self.falhar_no == Some(n) {
                return Err(AppError::EnvioPush("falha simulada".into()));
            }
            Ok(())
        }
    }

    fn clientes(db: &Arc<MemDb>) -> Arc<dyn ClienteRepo> {
        db.clone()
    }

    fn cliente(id: Uuid, tipo: TipoUsuario) -> Cliente {
        Cliente {
            id,
            email: format!("{id}@teste.com"),
            nome: "Fulano".into(),
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

    fn solicitacao(cliente_id: Uuid) -> Solicitacao {
        Solicitacao {
            id: Uuid::new_v4(),
            cliente_id,
            cliente_nome: "Fulano".into(),
            percentual: 80,
            status: StatusSolicitacao::Pendente,
            data_solicitacao: Utc::now(),
            data_agendamento: None,
            data_conclusao: None,
            coleta_id: None,
            atualizado_em: None,
        }
    }

    #[tokio::test]
    async fn sem_gateway_vira_no_op() {
        let db = Arc::new(MemDb::new());
        let destinatario = Uuid::new_v4();
        clientes(&db)
            .inserir(&cliente(destinatario, TipoUsuario::Cliente))
            .await
            .unwrap();

        let notificador = Notificador::new(None, db.clone());
        notificador
            .enviar(destinatario, "Oi", "mensagem", json!({}))
            .await
            .unwrap();

        // Nem histórico é gravado sem configuração.
        let perfil = clientes(&db)
            .buscar_por_id(destinatario)
            .await
            .unwrap()
            .unwrap();
        assert!(perfil.notificacoes.is_empty());
    }

    #[tokio::test]
    async fn historico_gravado_mesmo_com_push_falhando() {
        let db = Arc::new(MemDb::new());
        let destinatario = Uuid::new_v4();
        clientes(&db)
            .inserir(&cliente(destinatario, TipoUsuario::Cliente))
            .await
            .unwrap();

        let gateway = GatewayTeste::novo(Some(1));
        let notificador = Notificador::new(Some(gateway.clone()), db.clone());

        let erro = notificador
            .enviar(destinatario, "Oi", "mensagem", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(erro, AppError::EnvioPush(_)));

        let perfil = clientes(&db)
            .buscar_por_id(destinatario)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(perfil.notificacoes.len(), 1);
        assert_eq!(perfil.notificacoes[0].titulo, "Oi");
        assert!(!perfil.notificacoes[0].lida);
    }

    #[tokio::test]
    async fn falha_no_historico_nao_propaga() {
        let db = Arc::new(MemDb::new());
        // Destinatário sem perfil: o anexo do histórico falha com NaoEncontrado.
        let destinatario = Uuid::new_v4();

        let gateway = GatewayTeste::novo(None);
        let notificador = Notificador::new(Some(gateway.clone()), db);

        notificador
            .enviar(destinatario, "Oi", "mensagem", json!({}))
            .await
            .unwrap();
        assert_eq!(gateway.destinos().len(), 1);
    }

    #[tokio::test]
    async fn fanout_aborta_no_primeiro_erro() {
        let db = Arc::new(MemDb::new());
        let admins: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &admins {
            clientes(&db).inserir(&cliente(*id, TipoUsuario::Admin)).await.unwrap();
        }

        // Falha no segundo envio: 1..2 acontecem, 3..4 nunca.
        let gateway = GatewayTeste::novo(Some(2));
        let notificador = Notificador::new(Some(gateway.clone()), db);

        let erro = notificador
            .notificar_admins_nova_solicitacao(&admins, &solicitacao(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(erro, AppError::EnvioPush(_)));

        let destinos = gateway.destinos();
        assert_eq!(destinos.len(), 2);
        assert_eq!(destinos[0], admins[0].to_string());
        assert_eq!(destinos[1], admins[1].to_string());
    }

    #[tokio::test]
    async fn valor_formatado_na_coleta_concluida() {
        use crate::models::coleta::{Recipiente, StatusPagamento};
        use rust_decimal::Decimal;

        let db = Arc::new(MemDb::new());
        let destinatario = Uuid::new_v4();
        clientes(&db)
            .inserir(&cliente(destinatario, TipoUsuario::Cliente))
            .await
            .unwrap();

        let gateway = GatewayTeste::novo(None);
        let notificador = Notificador::new(Some(gateway.clone()), db.clone());

        let coleta = Coleta {
            id: Uuid::new_v4(),
            cliente_id: destinatario,
            coletor_id: Uuid::new_v4(),
            data_coleta: Utc::now(),
            recipiente: Recipiente {
                tipo: "caçamba".into(),
                localizacao: "pátio".into(),
            },
            materiais: Vec::new(),
            valor_total: Decimal::new(255, 1), // 25.5
            status_pagamento: StatusPagamento::Pendente,
            data_pagamento: None,
            solicitacao_id: None,
            criado_em: Utc::now(),
            atualizado_em: None,
        };

        notificador
            .notificar_coleta_concluida(destinatario, &coleta)
            .await
            .unwrap();

        let perfil = clientes(&db)
            .buscar_por_id(destinatario)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            perfil.notificacoes[0].mensagem,
            "Coleta realizada! Valor: R$ 25.50"
        );
    }

    #[test]
    fn sdk_guarda_operacoes_ate_ficar_pronto() {
        let sdk = SdkPush::new();
        sdk.vincular("a".into());
        sdk.desvincular();
        sdk.vincular("b".into());
        assert_eq!(sdk.vinculado(), None);

        sdk.pronto();
        assert_eq!(sdk.vinculado(), Some("b".into()));

        // Depois de pronto, aplica direto.
        sdk.desvincular();
        assert_eq!(sdk.vinculado(), None);
    }
}
