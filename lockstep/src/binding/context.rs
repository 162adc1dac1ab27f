use crate::binding::{InPlaceCopy, Port};
use std::fmt;
use tracing::trace;

/// One-way binding from a source port to a destination port, staged through
/// an owned buffer: `source -> buffer` on bubble up, `buffer -> destination`
/// on bubble down.
pub struct UniBinding<T> {
    source: Port<T>,
    destination: Port<T>,
    buffer: T,
}

impl<T: InPlaceCopy> UniBinding<T> {
    /// `factory` creates the intermediate buffer, once.
    pub fn new<F>(source: &Port<T>, destination: &Port<T>, factory: F) -> Self
    where
        F: FnOnce() -> T,
    {
        Self {
            source: source.clone(),
            destination: destination.clone(),
            buffer: factory(),
        }
    }

    /// Copies the source into the buffer. Returns false if the source was
    /// locked and the copy skipped.
    pub fn update_buffer_from_source(&mut self) -> bool {
        let Some(source) = self.source.try_lock() else {
            return false;
        };
        self.buffer.copy_from(&source);
        true
    }

    /// Copies the buffer into the destination. Returns false if the
    /// destination was locked and the copy skipped.
    pub fn update_destination_from_buffer(&self) -> bool {
        let Some(mut destination) = self.destination.try_lock() else {
            return false;
        };
        destination.copy_from(&self.buffer);
        true
    }

    pub fn buffer(&self) -> &T {
        &self.buffer
    }
}

impl<T: fmt::Debug> fmt::Debug for UniBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniBinding")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

// Type-erased view so one context can hold bindings of any field type.
trait Binding: Send {
    fn update_buffer_from_source(&mut self) -> bool;
    fn update_destination_from_buffer(&self) -> bool;
}

impl<T: InPlaceCopy + Send> Binding for UniBinding<T> {
    fn update_buffer_from_source(&mut self) -> bool {
        UniBinding::update_buffer_from_source(self)
    }

    fn update_destination_from_buffer(&self) -> bool {
        UniBinding::update_destination_from_buffer(self)
    }
}

/// Master context made of point-to-point bindings instead of one shared
/// aggregate.
///
/// Each binding keeps its own buffer, so unrelated task pairs never write the
/// same data. Use it as the context type of a scheduler whose tasks are
/// [`BindingTask`]s.
///
/// [`BindingTask`]: crate::binding::BindingTask
#[derive(Default)]
pub struct BindingContext {
    bindings: Vec<Box<dyn Binding>>,
}

impl fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContext")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl BindingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `source` to `destination`. The buffer is built by `factory`.
    pub fn bind<T, F>(&mut self, source: &Port<T>, destination: &Port<T>, factory: F)
    where
        T: InPlaceCopy + Send + 'static,
        F: FnOnce() -> T,
    {
        self.bindings
            .push(Box::new(UniBinding::new(source, destination, factory)));
    }

    /// Bubble up: refreshes every buffer from its source.
    pub fn update_master_context(&mut self) {
        let mut skipped = 0usize;
        for binding in &mut self.bindings {
            if !binding.update_buffer_from_source() {
                skipped += 1;
            }
        }

        if skipped > 0 {
            trace!(skipped, "busy sources left their buffers unchanged");
        }
    }

    /// Bubble down: writes every buffer into its destination.
    pub fn update_local_context(&self) {
        let skipped = self
            .bindings
            .iter()
            .filter(|binding| !binding.update_destination_from_buffer())
            .count();

        if skipped > 0 {
            trace!(skipped, "busy destinations were not updated");
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
