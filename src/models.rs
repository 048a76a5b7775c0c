pub mod auth;
pub mod cliente;
pub mod coleta;
pub mod material;
pub mod solicitacao;

pub use auth::AuthUser;
pub use cliente::{AtualizaCliente, Cliente, Notificacao, NovoCliente, TipoUsuario};
pub use coleta::{
    Coleta, FiltroColetas, LinhaMaterial, NovaColeta, NovaLinha, Periodo, Recipiente,
    StatusPagamento, TotalMaterial,
};
pub use material::{AtualizaMaterial, Material, NovoMaterial, MATERIAIS_PADRAO};
pub use solicitacao::{FiltroSolicitacoes, NovaSolicitacao, Solicitacao, StatusSolicitacao};
