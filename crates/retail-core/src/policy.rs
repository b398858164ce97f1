//! Política de acceso por fila sobre la tabla de usuarios.
//!
//! Reproduce la semántica de row-level security del esquema: un caller
//! autenticado sólo alcanza la fila cuyo id coincide con su identidad; las
//! demás filas se comportan como inexistentes. La identidad de servicio
//! omite la política, igual que una service key frente a RLS. Sólo la tabla
//! de usuarios lleva política; el resto del esquema no tiene equivalente.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// Identidad de servicio: sin restricción por fila.
    Service,
    /// Usuario autenticado, identificado por su id de fila.
    User(Uuid),
}

impl Caller {
    /// Predicado de la política: ¿puede este caller ver/modificar la fila?
    pub fn may_access_user_row(&self, row_id: Uuid) -> bool {
        match self {
            Caller::Service => true,
            Caller::User(id) => *id == row_id,
        }
    }

    /// Identidad a propagar al motor (setting `app.current_user_id`).
    pub fn rls_identity(&self) -> Option<Uuid> {
        match self {
            Caller::Service => None,
            Caller::User(id) => Some(*id),
        }
    }
}
