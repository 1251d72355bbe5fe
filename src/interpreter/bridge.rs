//! Capability seam for `extern` classes.
//!
//! Scripts never reach the host directly: every extern construction or call
//! goes through this trait, argument conversion happens interpreter-side,
//! and a host `Err` surfaces in the script as a catchable Exception rather
//! than a crash.

use std::{any::Any, fmt, rc::Rc};

/// An opaque host value travelling through script code. The type name is
/// whatever the bridge reported, scripts see it in `typeof` output.
#[derive(Clone)]
pub struct HostObject {
	pub type_name: Rc<str>,
	pub value:     Rc<dyn Any>,
}

impl fmt::Debug for HostObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("HostObject").field(&self.type_name).finish()
	}
}

/// Mirror of the script value model for crossing the bridge.
#[derive(Debug, Clone)]
pub enum HostArg {
	Null,
	Num(f64),
	Bool(bool),
	Char(char),
	Str(String),
	Array(Vec<HostArg>),
	Boxed(HostObject),
}

/// What a host must provide to back `extern class` declarations.
pub trait HostBridge {
	/// Whether the host knows the type. Checked at declaration time, an
	/// unknown type is a load error.
	fn resolve_type(&self, full_name: &str) -> bool;

	/// `new Ref(args)` for an extern reference.
	fn construct(&self, type_name: &str, args: &[HostArg]) -> Result<HostArg, String>;

	/// A member call, static when `target` is None. The member name arrives
	/// with its first letter upcased.
	fn invoke(
		&self,
		type_name: &str,
		target: Option<&HostObject>,
		member: &str,
		args: &[HostArg],
	) -> Result<HostArg, String>;
}

/// The default bridge: no host types at all.
pub struct NoBridge;

impl HostBridge for NoBridge {
	fn resolve_type(&self, _full_name: &str) -> bool { false }

	fn construct(&self, type_name: &str, _args: &[HostArg]) -> Result<HostArg, String> {
		Err(format!("no host bridge installed, cannot construct {type_name}"))
	}

	fn invoke(
		&self,
		type_name: &str,
		_target: Option<&HostObject>,
		member: &str,
		_args: &[HostArg],
	) -> Result<HostArg, String> {
		Err(format!("no host bridge installed, cannot call {type_name}.{member}"))
	}
}
