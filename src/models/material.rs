use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

/// Catálogo fixo usado na semente inicial da coleção `materiais`.
pub const MATERIAIS_PADRAO: [&str; 13] = [
    "Cavaco de ferro",
    "Cavaco de alumínio",
    "Cavaco de inox",
    "Cavaco de cobre",
    "Cavaco de bronze",
    "Cavaco de latão",
    "Bucha de bronze",
    "Pedaço de inox",
    "Pedaço de alumínio",
    "Sucata miúda",
    "Sucata pesada",
    "Oxicorte",
    "Estamparia",
];

/// Entrada do catálogo de materiais. Exclusão é sempre lógica: `ativo` vira
/// false e `excluido_em` é carimbado, o registro nunca sai do banco.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: Uuid,
    pub nome: String,
    pub preco_padrao: Decimal,
    /// Preço por cliente, sobrepondo o padrão. Chave = id do cliente.
    pub precos_personalizados: HashMap<Uuid, Decimal>,
    pub ativo: bool,
    pub criado_em: DateTime<Utc>,
    pub atualizado_em: Option<DateTime<Utc>>,
    pub excluido_em: Option<DateTime<Utc>>,
}

impl Material {
    /// Preço efetivo para um cliente: o personalizado, se houver, senão o padrão.
    pub fn preco_para(&self, cliente_id: Uuid) -> Decimal {
        self.precos_personalizados
            .get(&cliente_id)
            .copied()
            .unwrap_or(self.preco_padrao)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NovoMaterial {
    #[validate(length(min = 1, message = "O nome é obrigatório"))]
    pub nome: String,
    pub preco_padrao: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtualizaMaterial {
    pub nome: Option<String>,
    pub preco_padrao: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preco_para_cai_no_padrao_sem_personalizado() {
        let cliente = Uuid::new_v4();
        let outro = Uuid::new_v4();
        let mut material = Material {
            id: Uuid::new_v4(),
            nome: "Cavaco de cobre".into(),
            preco_padrao: Decimal::new(250, 2), // 2.50
            precos_personalizados: HashMap::new(),
            ativo: true,
            criado_em: Utc::now(),
            atualizado_em: None,
            excluido_em: None,
        };
        assert_eq!(material.preco_para(cliente), Decimal::new(250, 2));

        material
            .precos_personalizados
            .insert(cliente, Decimal::new(310, 2));
        assert_eq!(material.preco_para(cliente), Decimal::new(310, 2));
        assert_eq!(material.preco_para(outro), Decimal::new(250, 2));
    }
}
