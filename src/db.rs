pub mod cliente_repo;
pub use cliente_repo::{ClienteRepo, PgClienteRepo};
pub mod material_repo;
pub use material_repo::{MaterialRepo, PgMaterialRepo};
pub mod coleta_repo;
pub use coleta_repo::{ColetaRepo, PgColetaRepo};
pub mod solicitacao_repo;
pub use solicitacao_repo::{
    AoMudarPendentes, Assinatura, MudancaStatus, PgSolicitacaoRepo, SolicitacaoRepo,
};
pub mod mem;
pub use mem::MemDb;
