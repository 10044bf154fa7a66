//! Error Boundaries
//!
//! Effect failures are routed to an error handler instead of unwinding
//! through the scheduler. Handlers form a thread-local stack; an error
//! boundary pushes itself before building its subtree, so every effect
//! created inside captures it.
//!
//! When an effect fails, the handler it captured at creation is used,
//! falling back to whatever handler is on top of the stack at the time of
//! failure. If there is none, the runtime escalates the error after the
//! current batch settles.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::EffectError;

/// Callback that receives effect failures.
pub type ErrorHandler = Rc<dyn Fn(EffectError)>;

thread_local! {
    static HANDLERS: RefCell<Vec<ErrorHandler>> = const { RefCell::new(Vec::new()) };
}

/// Push a handler; it stays current until popped.
pub fn push_error_handler(handler: ErrorHandler) {
    HANDLERS.with(|handlers| handlers.borrow_mut().push(handler));
}

/// Pop the most recently pushed handler.
pub fn pop_error_handler() -> Option<ErrorHandler> {
    HANDLERS
        .try_with(|handlers| handlers.borrow_mut().pop())
        .ok()
        .flatten()
}

/// The handler on top of the stack.
pub fn current_error_handler() -> Option<ErrorHandler> {
    HANDLERS.with(|handlers| handlers.borrow().last().cloned())
}

/// Run `f` with `handler` pushed, popping it afterwards even on unwind.
pub fn with_error_handler<R>(handler: impl Fn(EffectError) + 'static, f: impl FnOnce() -> R) -> R {
    push_error_handler(Rc::new(handler));
    let _guard = HandlerGuard;
    f()
}

struct HandlerGuard;

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        pop_error_handler();
    }
}
