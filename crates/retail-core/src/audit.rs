//! Sello de auditoría: en cada UPDATE a una entidad auditada, estampar su
//! campo de marca temporal con la hora actual, pise lo que pise el caller.
//! Es el mismo patrón que el trigger `set_row_updated_at()` de la migración
//! SQL, generalizado a cualquier entidad que lleve `updated_at`.

use chrono::{DateTime, Utc};
use retail_domain::User;

pub trait AuditStamped {
    fn stamp_updated_at(&mut self, at: DateTime<Utc>);
}

impl AuditStamped for User {
    fn stamp_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Aplica el sello con la hora actual. Los backends lo invocan al final de
/// cada ruta de update, después de aplicar los cambios del caller.
pub fn touch<T: AuditStamped>(row: &mut T) {
    row.stamp_updated_at(Utc::now());
}
