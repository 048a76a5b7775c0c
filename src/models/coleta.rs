use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// Mapeia o CREATE TYPE status_pagamento do banco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "status_pagamento", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StatusPagamento {
    Pendente,
    Pago,
    Cancelado,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipiente {
    pub tipo: String,
    pub localizacao: String,
}

/// Linha de material de uma coleta. Peso líquido e valor são sempre
/// recalculados a partir dos pesos brutos e do preço unitário; nunca vêm do
/// chamador (ver [`NovaLinha::calcular`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinhaMaterial {
    pub nome_material: String,
    pub peso_bruto: Decimal,
    pub peso_recipiente: Decimal,
    pub peso_liquido: Decimal,
    pub preco_unitario: Decimal,
    pub valor_total: Decimal,
}

/// Um evento de coleta já realizado. Imutável depois de criado, exceto pelo
/// status de pagamento.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coleta {
    pub id: Uuid,
    pub cliente_id: Uuid,
    pub coletor_id: Uuid,
    pub data_coleta: DateTime<Utc>,
    pub recipiente: Recipiente,
    pub materiais: Vec<LinhaMaterial>,
    pub valor_total: Decimal,
    pub status_pagamento: StatusPagamento,
    pub data_pagamento: Option<DateTime<Utc>>,
    pub solicitacao_id: Option<Uuid>,
    pub criado_em: DateTime<Utc>,
    pub atualizado_em: Option<DateTime<Utc>>,
}

/// Entrada crua de uma linha: o chamador informa apenas pesos e preço.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NovaLinha {
    pub nome_material: String,
    pub peso_bruto: Decimal,
    pub peso_recipiente: Decimal,
    pub preco_unitario: Decimal,
}

impl NovaLinha {
    /// Calcula os totais da linha: líquido = bruto − recipiente,
    /// valor = líquido × preço unitário.
    pub fn calcular(&self) -> LinhaMaterial {
        let peso_liquido = self.peso_bruto - self.peso_recipiente;
        LinhaMaterial {
            nome_material: self.nome_material.clone(),
            peso_bruto: self.peso_bruto,
            peso_recipiente: self.peso_recipiente,
            peso_liquido,
            preco_unitario: self.preco_unitario,
            valor_total: peso_liquido * self.preco_unitario,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NovaColeta {
    pub cliente_id: Uuid,
    pub coletor_id: Uuid,
    /// Quando ausente, a data da coleta é o momento da criação.
    pub data_coleta: Option<DateTime<Utc>>,
    pub recipiente: Recipiente,
    #[validate(length(min = 1, message = "A coleta precisa de pelo menos um material"))]
    pub materiais: Vec<NovaLinha>,
    pub solicitacao_id: Option<Uuid>,
}

/// Intervalo inclusivo de datas; os dois limites andam sempre juntos.
#[derive(Debug, Clone, Copy)]
pub struct Periodo {
    pub inicio: DateTime<Utc>,
    pub fim: DateTime<Utc>,
}

/// Filtros de listagem, combinados em conjunção.
#[derive(Debug, Clone, Default)]
pub struct FiltroColetas {
    pub cliente_id: Option<Uuid>,
    pub periodo: Option<Periodo>,
    pub limite: Option<i64>,
}

/// Agregado por nome de material, derivado da lista em cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalMaterial {
    pub peso: Decimal,
    pub valor: Decimal,
    pub quantidade: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn linha_recalcula_liquido_e_valor() {
        let linha = NovaLinha {
            nome_material: "Cavaco de ferro".into(),
            peso_bruto: dec("10.5"),
            peso_recipiente: dec("2.0"),
            preco_unitario: dec("3.0"),
        }
        .calcular();

        assert_eq!(linha.peso_liquido, dec("8.5"));
        assert_eq!(linha.valor_total, dec("25.5"));
    }

    #[test]
    fn linha_com_recipiente_mais_pesado_fica_negativa() {
        // Entrada inválida não é rejeitada aqui; o cálculo apenas reflete os
        // pesos informados.
        let linha = NovaLinha {
            nome_material: "Sucata miúda".into(),
            peso_bruto: dec("1.0"),
            peso_recipiente: dec("2.5"),
            preco_unitario: dec("2.0"),
        }
        .calcular();

        assert_eq!(linha.peso_liquido, dec("-1.5"));
        assert_eq!(linha.valor_total, dec("-3.0"));
    }
}
