//! As stores reativas do painel: cada uma guarda uma lista em cache e um flag
//! de carregamento, e segue o contrato "escreve remoto, depois relê a lista
//! inteira" — sem patch otimista. Duas leituras em voo na mesma store
//! resolvem por last-write-wins na atribuição da lista, comportamento
//! conhecido e aceito.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod sessao;
pub use sessao::SessaoStore;
pub mod clientes;
pub use clientes::ClientesStore;
pub mod materiais;
pub use materiais::MateriaisStore;
pub mod coletas;
pub use coletas::ColetasStore;
pub mod solicitacoes;
pub use solicitacoes::SolicitacoesStore;

/// Liga o flag de carregamento pela duração da chamada; desliga no Drop,
/// inclusive em erro.
pub(crate) struct GuiaCarregando<'a>(&'a AtomicBool);

impl<'a> GuiaCarregando<'a> {
    pub(crate) fn ligar(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for GuiaCarregando<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
