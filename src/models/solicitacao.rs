use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// Mapeia o CREATE TYPE status_solicitacao do banco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "status_solicitacao", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StatusSolicitacao {
    Pendente,
    Agendada,
    Concluida,
    Cancelada,
}

impl StatusSolicitacao {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusSolicitacao::Pendente => "pendente",
            StatusSolicitacao::Agendada => "agendada",
            StatusSolicitacao::Concluida => "concluida",
            StatusSolicitacao::Cancelada => "cancelada",
        }
    }

    fn terminal(&self) -> bool {
        matches!(
            self,
            StatusSolicitacao::Concluida | StatusSolicitacao::Cancelada
        )
    }

    /// Transições andam só para frente: pendente → agendada → concluída.
    /// Cancelada é terminal e alcançável a partir dos dois estados abertos.
    /// Nenhum estado reabre.
    pub fn pode_avancar_para(&self, novo: StatusSolicitacao) -> bool {
        if self.terminal() || novo == *self {
            return false;
        }
        match novo {
            StatusSolicitacao::Pendente => false,
            StatusSolicitacao::Agendada => *self == StatusSolicitacao::Pendente,
            StatusSolicitacao::Concluida | StatusSolicitacao::Cancelada => true,
        }
    }
}

/// Um pedido de coleta feito pelo cliente, ainda não (ou já) atendido.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solicitacao {
    pub id: Uuid,
    pub cliente_id: Uuid,
    pub cliente_nome: String,
    /// Nível de enchimento do recipiente informado pelo cliente (0–100).
    pub percentual: i32,
    pub status: StatusSolicitacao,
    pub data_solicitacao: DateTime<Utc>,
    pub data_agendamento: Option<DateTime<Utc>>,
    pub data_conclusao: Option<DateTime<Utc>>,
    /// Preenchido quando a solicitação vira uma coleta.
    pub coleta_id: Option<Uuid>,
    pub atualizado_em: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NovaSolicitacao {
    pub cliente_id: Uuid,
    #[validate(length(min = 1, message = "O nome do cliente é obrigatório"))]
    pub cliente_nome: String,
    #[validate(range(min = 0, max = 100, message = "Percentual fora de 0–100"))]
    pub percentual: i32,
}

#[derive(Debug, Clone, Default)]
pub struct FiltroSolicitacoes {
    pub status: Option<StatusSolicitacao>,
    pub cliente_id: Option<Uuid>,
    pub periodo: Option<super::coleta::Periodo>,
    pub limite: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::StatusSolicitacao::*;

    #[test]
    fn transicoes_andam_so_para_frente() {
        assert!(Pendente.pode_avancar_para(Agendada));
        assert!(Pendente.pode_avancar_para(Concluida));
        assert!(Pendente.pode_avancar_para(Cancelada));
        assert!(Agendada.pode_avancar_para(Concluida));
        assert!(Agendada.pode_avancar_para(Cancelada));

        // Nada reabre nem repete.
        assert!(!Agendada.pode_avancar_para(Pendente));
        assert!(!Agendada.pode_avancar_para(Agendada));
        assert!(!Concluida.pode_avancar_para(Agendada));
        assert!(!Concluida.pode_avancar_para(Cancelada));
        assert!(!Cancelada.pode_avancar_para(Pendente));
        assert!(!Cancelada.pode_avancar_para(Concluida));
    }
}
