//! Host-facing hardware capability

use crate::error::Result;
use crate::interp::Interpreter;

/// The host's one obligation: wire the hardware a program runs against.
///
/// Invoked exactly once, during binding, with the symbol tables already
/// parsed. All register/array definitions and subscription wiring the
/// program needs must happen here, through the interpreter's define and
/// lookup operations.
pub trait Hardware {
    fn wire(&mut self, state: &mut Interpreter) -> Result<()>;
}

/// Closures wire hardware directly; host state rides in the captures.
impl<F> Hardware for F
where
    F: FnMut(&mut Interpreter) -> Result<()>,
{
    fn wire(&mut self, state: &mut Interpreter) -> Result<()> {
        self(state)
    }
}
