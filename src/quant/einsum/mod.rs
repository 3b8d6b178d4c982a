//! Einsum contraction with optional quantization of either operand
//!
//! - [`EinsumSpec`]: two-operand equation parsing (`"bij,bjk->bik"`)
//! - [`Accumulator`]: provably wide integer accumulator for level products
//! - [`fake_quant_einsum`]: routing between float, dequantized-float and
//!   integer contraction

mod accumulator;
mod contract;
mod routing;
mod spec;


pub use accumulator::Accumulator;
pub use routing::{einsum, fake_quant_einsum};
pub use spec::EinsumSpec;
