pub mod accounts;
pub mod extract;
pub mod jwt;
pub mod password;

pub use accounts::{create_account, ensure_admin, NewAccount};
pub use extract::{AuthUser, RequireAdmin, RequireStaff};
pub use jwt::{Claims, JwtConfig};
