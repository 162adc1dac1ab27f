use crate::binding::BindingContext;
use crate::task::Task;

/// Lifecycle half of a task whose data flows through a [`BindingContext`].
///
/// The context hooks are supplied by [`BindingTask`], implementors only read
/// and write their own ports.
pub trait TaskBody: Send {
    fn initialize(&mut self) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn execute(&mut self) -> anyhow::Result<()>;

    fn cleanup(&mut self) {}
}

/// Runs a [`TaskBody`] as a `Task<BindingContext>`: bubbling up or down
/// refreshes every binding of the context.
#[derive(Debug)]
pub struct BindingTask<B>(pub B);

impl<B: TaskBody> Task<BindingContext> for BindingTask<B> {
    fn initialize(&mut self) -> anyhow::Result<bool> {
        self.0.initialize()
    }

    fn execute(&mut self) -> anyhow::Result<()> {
        self.0.execute()
    }

    fn cleanup(&mut self) {
        self.0.cleanup()
    }

    fn update_master_context(&mut self, context: &mut BindingContext) {
        context.update_master_context();
    }

    fn update_local_context(&mut self, context: &BindingContext) {
        context.update_local_context();
    }
}
