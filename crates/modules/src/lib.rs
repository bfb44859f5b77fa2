//! rg-bar-modules: built-in status bar modules for rg-bar.

mod clock;
mod cpu;
mod message;
mod socket_feed;
mod static_text;

pub use clock::{ClockModule, ClockOptions};
pub use cpu::{format_usage, CpuModule, CpuOptions};
pub use message::{MessageModule, MessageOptions};
pub use socket_feed::{FeedFraming, SocketFeedModule, SocketFeedOptions};
pub use static_text::{StaticTextModule, StaticTextOptions};

use rg_bar_core::{BoxedModule, FnFactory, Module, ModuleRegistry};

/// Names of the built-in module factories
pub const BUILTIN_MODULES: &[&str] = &["clock", "cpu", "static_text", "message", "socket_feed"];

/// Factory that builds `M` and initializes it with the given config
fn factory<M>(name: &str) -> FnFactory
where
    M: Module + Default + 'static,
{
    FnFactory::new(name, |config| {
        let mut module = M::default();
        module.initialize(config)?;
        Ok(Box::new(module) as BoxedModule)
    })
}

/// Register all built-in module factories
pub fn register_all(registry: &ModuleRegistry) -> rg_bar_core::Result<()> {
    registry.register_factory(factory::<ClockModule>("clock"))?;
    registry.register_factory(factory::<CpuModule>("cpu"))?;
    registry.register_factory(factory::<StaticTextModule>("static_text"))?;
    registry.register_factory(factory::<MessageModule>("message"))?;
    registry.register_factory(factory::<SocketFeedModule>("socket_feed"))?;
    log::debug!("Registered {} built-in module factories", BUILTIN_MODULES.len());
    Ok(())
}
