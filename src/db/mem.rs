//! Backend de memória dos quatro seams de coleção. Serve aos testes e ao
//! desenvolvimento local sem Postgres; a semântica de filtros, ordenação e
//! exclusão lógica é a mesma do backend Pg.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::db::cliente_repo::ClienteRepo;
use crate::db::coleta_repo::ColetaRepo;
use crate::db::material_repo::MaterialRepo;
use crate::db::solicitacao_repo::{AoMudarPendentes, Assinatura, MudancaStatus, SolicitacaoRepo};
use crate::models::cliente::{AtualizaCliente, Cliente, Notificacao, TipoUsuario};
use crate::models::coleta::{Coleta, FiltroColetas, StatusPagamento};
use crate::models::material::{AtualizaMaterial, Material};
use crate::models::solicitacao::{FiltroSolicitacoes, Solicitacao, StatusSolicitacao};

pub struct MemDb {
    clientes: RwLock<HashMap<Uuid, Cliente>>,
    materiais: RwLock<HashMap<Uuid, Material>>,
    coletas: RwLock<HashMap<Uuid, Coleta>>,
    // Arc para a tarefa da consulta ao vivo enxergar o mesmo mapa.
    solicitacoes: Arc<RwLock<HashMap<Uuid, Solicitacao>>>,
    // Toque de "mudou algo" para a consulta ao vivo de pendentes.
    pendentes_tx: broadcast::Sender<()>,
}

fn pendentes_de(mapa: &HashMap<Uuid, Solicitacao>) -> Vec<Solicitacao> {
    let mut lista: Vec<Solicitacao> = mapa
        .values()
        .filter(|s| s.status == StatusSolicitacao::Pendente)
        .cloned()
        .collect();
    lista.sort_by(|a, b| b.data_solicitacao.cmp(&a.data_solicitacao));
    lista
}

impl MemDb {
    pub fn new() -> Self {
        let (pendentes_tx, _) = broadcast::channel(16);
        Self {
            clientes: RwLock::new(HashMap::new()),
            materiais: RwLock::new(HashMap::new()),
            coletas: RwLock::new(HashMap::new()),
            solicitacoes: Arc::new(RwLock::new(HashMap::new())),
            pendentes_tx,
        }
    }

    fn avisar_pendentes(&self) {
        // Sem assinantes não é erro.
        let _ = self.pendentes_tx.send(());
    }

    fn pendentes(&self) -> Vec<Solicitacao> {
        pendentes_de(&self.solicitacoes.read().expect("lock envenenado"))
    }
}

impl Default for MemDb {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClienteRepo for MemDb {
    async fn listar_clientes(&self) -> Result<Vec<Cliente>, AppError> {
        let mapa = self.clientes.read().expect("lock envenenado");
        let mut lista: Vec<Cliente> = mapa
            .values()
            .filter(|c| c.tipo == TipoUsuario::Cliente)
            .cloned()
            .collect();
        lista.sort_by(|a, b| a.nome.cmp(&b.nome));
        Ok(lista)
    }

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Cliente>, AppError> {
        Ok(self
            .clientes
            .read()
            .expect("lock envenenado")
            .get(&id)
            .cloned())
    }

    async fn inserir(&self, cliente: &Cliente) -> Result<(), AppError> {
        self.clientes
            .write()
            .expect("lock envenenado")
            .insert(cliente.id, cliente.clone());
        Ok(())
    }

    async fn atualizar(&self, id: Uuid, dados: &AtualizaCliente) -> Result<(), AppError> {
        let mut mapa = self.clientes.write().expect("lock envenenado");
        let cliente = mapa.get_mut(&id).ok_or(AppError::NaoEncontrado)?;
        if let Some(nome) = &dados.nome {
            cliente.nome = nome.clone();
        }
        if let Some(cpf_cnpj) = &dados.cpf_cnpj {
            cliente.cpf_cnpj = cpf_cnpj.clone();
        }
        if let Some(endereco) = &dados.endereco {
            cliente.endereco = endereco.clone();
        }
        if let Some(telefone) = &dados.telefone {
            cliente.telefone = telefone.clone();
        }
        cliente.atualizado_em = Some(Utc::now());
        Ok(())
    }

    async fn definir_ativo(&self, id: Uuid, ativo: bool) -> Result<(), AppError> {
        let mut mapa = self.clientes.write().expect("lock envenenado");
        let cliente = mapa.get_mut(&id).ok_or(AppError::NaoEncontrado)?;
        cliente.ativo = ativo;
        cliente.atualizado_em = Some(Utc::now());
        Ok(())
    }

    async fn anexar_notificacao(&self, id: Uuid, n: &Notificacao) -> Result<(), AppError> {
        let mut mapa = self.clientes.write().expect("lock envenenado");
        let cliente = mapa.get_mut(&id).ok_or(AppError::NaoEncontrado)?;
        cliente.notificacoes.push(n.clone());
        Ok(())
    }

    async fn listar_admins(&self) -> Result<Vec<Uuid>, AppError> {
        let mapa = self.clientes.read().expect("lock envenenado");
        let mut ids: Vec<Uuid> = mapa
            .values()
            .filter(|c| c.tipo == TipoUsuario::Admin)
            .map(|c| c.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl MaterialRepo for MemDb {
    async fn listar_ativos(&self) -> Result<Vec<Material>, AppError> {
        let mapa = self.materiais.read().expect("lock envenenado");
        let mut lista: Vec<Material> = mapa.values().filter(|m| m.ativo).cloned().collect();
        lista.sort_by(|a, b| a.nome.cmp(&b.nome));
        Ok(lista)
    }

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Material>, AppError> {
        Ok(self
            .materiais
            .read()
            .expect("lock envenenado")
            .get(&id)
            .cloned())
    }

    async fn contar(&self) -> Result<i64, AppError> {
        Ok(self.materiais.read().expect("lock envenenado").len() as i64)
    }

    async fn inserir(&self, material: &Material) -> Result<(), AppError> {
        self.materiais
            .write()
            .expect("lock envenenado")
            .insert(material.id, material.clone());
        Ok(())
    }

    async fn atualizar(&self, id: Uuid, dados: &AtualizaMaterial) -> Result<(), AppError> {
        let mut mapa = self.materiais.write().expect("lock envenenado");
        let material = mapa.get_mut(&id).ok_or(AppError::NaoEncontrado)?;
        if let Some(nome) = &dados.nome {
            material.nome = nome.clone();
        }
        if let Some(preco) = dados.preco_padrao {
            material.preco_padrao = preco;
        }
        material.atualizado_em = Some(Utc::now());
        Ok(())
    }

    async fn definir_preco_cliente(
        &self,
        material_id: Uuid,
        cliente_id: Uuid,
        preco: Decimal,
    ) -> Result<(), AppError> {
        let mut mapa = self.materiais.write().expect("lock envenenado");
        let material = mapa.get_mut(&material_id).ok_or(AppError::NaoEncontrado)?;
        material.precos_personalizados.insert(cliente_id, preco);
        material.atualizado_em = Some(Utc::now());
        Ok(())
    }

    async fn excluir(&self, id: Uuid) -> Result<(), AppError> {
        let mut mapa = self.materiais.write().expect("lock envenenado");
        let material = mapa.get_mut(&id).ok_or(AppError::NaoEncontrado)?;
        material.ativo = false;
        material.excluido_em = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl ColetaRepo for MemDb {
    async fn listar(&self, filtro: &FiltroColetas) -> Result<Vec<Coleta>, AppError> {
        let mapa = self.coletas.read().expect("lock envenenado");
        let mut lista: Vec<Coleta> = mapa
            .values()
            .filter(|c| filtro.cliente_id.is_none_or(|id| c.cliente_id == id))
            .filter(|c| {
                filtro
                    .periodo
                    .is_none_or(|p| c.data_coleta >= p.inicio && c.data_coleta <= p.fim)
            })
            .cloned()
            .collect();
        lista.sort_by(|a, b| b.data_coleta.cmp(&a.data_coleta));
        if let Some(limite) = filtro.limite {
            lista.truncate(limite as usize);
        }
        Ok(lista)
    }

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Coleta>, AppError> {
        Ok(self
            .coletas
            .read()
            .expect("lock envenenado")
            .get(&id)
            .cloned())
    }

    async fn inserir(&self, coleta: &Coleta) -> Result<(), AppError> {
        self.coletas
            .write()
            .expect("lock envenenado")
            .insert(coleta.id, coleta.clone());
        Ok(())
    }

    async fn atualizar_pagamento(
        &self,
        id: Uuid,
        status: StatusPagamento,
        data_pagamento: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut mapa = self.coletas.write().expect("lock envenenado");
        let coleta = mapa.get_mut(&id).ok_or(AppError::NaoEncontrado)?;
        coleta.status_pagamento = status;
        coleta.data_pagamento = data_pagamento;
        coleta.atualizado_em = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl SolicitacaoRepo for MemDb {
    async fn listar(&self, filtro: &FiltroSolicitacoes) -> Result<Vec<Solicitacao>, AppError> {
        let mapa = self.solicitacoes.read().expect("lock envenenado");
        let mut lista: Vec<Solicitacao> = mapa
            .values()
            .filter(|s| filtro.status.is_none_or(|st| s.status == st))
            .filter(|s| filtro.cliente_id.is_none_or(|id| s.cliente_id == id))
            .filter(|s| {
                filtro
                    .periodo
                    .is_none_or(|p| s.data_solicitacao >= p.inicio && s.data_solicitacao <= p.fim)
            })
            .cloned()
            .collect();
        lista.sort_by(|a, b| b.data_solicitacao.cmp(&a.data_solicitacao));
        if let Some(limite) = filtro.limite {
            lista.truncate(limite as usize);
        }
        Ok(lista)
    }

    async fn buscar_por_id(&self, id: Uuid) -> Result<Option<Solicitacao>, AppError> {
        Ok(self
            .solicitacoes
            .read()
            .expect("lock envenenado")
            .get(&id)
            .cloned())
    }

    async fn inserir(&self, solicitacao: &Solicitacao) -> Result<(), AppError> {
        self.solicitacoes
            .write()
            .expect("lock envenenado")
            .insert(solicitacao.id, solicitacao.clone());
        self.avisar_pendentes();
        Ok(())
    }

    async fn atualizar_status(&self, id: Uuid, mudanca: &MudancaStatus) -> Result<(), AppError> {
        {
            let mut mapa = self.solicitacoes.write().expect("lock envenenado");
            let solicitacao = mapa.get_mut(&id).ok_or(AppError::NaoEncontrado)?;
            solicitacao.status = mudanca.status;
            if mudanca.data_agendamento.is_some() {
                solicitacao.data_agendamento = mudanca.data_agendamento;
            }
            if mudanca.data_conclusao.is_some() {
                solicitacao.data_conclusao = mudanca.data_conclusao;
            }
            if mudanca.coleta_id.is_some() {
                solicitacao.coleta_id = mudanca.coleta_id;
            }
            solicitacao.atualizado_em = Some(Utc::now());
        }
        self.avisar_pendentes();
        Ok(())
    }

    async fn assinar_pendentes(
        &self,
        callback: AoMudarPendentes,
    ) -> Result<Assinatura, AppError> {
        let mut rx = self.pendentes_tx.subscribe();
        // Entrega inicial síncrona; depois, uma releitura por aviso.
        callback(self.pendentes());

        let fonte = Arc::clone(&self.solicitacoes);
        let tarefa = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    // Avisos perdidos por atraso não importam: cada entrega
                    // relê a lista inteira.
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        callback(pendentes_de(&fonte.read().expect("lock envenenado")));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Assinatura::new(tarefa))
    }
}
