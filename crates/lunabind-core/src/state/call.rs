//! Calls and protected calls.

use crate::error::RuntimeError;
use crate::function::Function;
use crate::value::Value;

use super::State;

/// Keep every result a call produces.
pub const MULTRET: i32 = -1;

impl State {
    /// Call the function below the top `nargs` values.
    ///
    /// The function and its arguments are replaced by the results, adjusted
    /// to `nresults` (or all of them with [`MULTRET`]). On error the function
    /// and its arguments are removed and the error is returned.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, nargs: i32, nresults: i32) -> Result<(), RuntimeError> {
        let func_pos = self.function_position(nargs)?;
        self.call_at(func_pos, nresults)
    }

    /// Like [`call`](Self::call), but on failure the error message is pushed
    /// in place of the function before the error is returned.
    pub fn pcall(&self, nargs: i32, nresults: i32) -> Result<(), RuntimeError> {
        let func_pos = match self.function_position(nargs) {
            Ok(pos) => pos,
            Err(err) => {
                self.push_string(&err.to_string());
                return Err(err);
            }
        };
        match self.call_at(func_pos, nresults) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.truncate_to(func_pos);
                self.push_string(&err.to_string());
                Err(err)
            }
        }
    }

    /// Call `function` with `args` and return its results, leaving the stack
    /// as it was.
    pub fn call_function<I>(
        &self,
        function: Value,
        args: I,
        nresults: i32,
    ) -> Result<Vec<Value>, RuntimeError>
    where
        I: IntoIterator<Item = Value>,
    {
        let func_pos = self.absolute_top();
        self.push_value(function);
        for arg in args {
            self.push_value(arg);
        }
        self.call_at(func_pos, nresults)?;
        let results = {
            let mut stack = self.0.stack.borrow_mut();
            stack.values.split_off(func_pos)
        };
        Ok(results)
    }

    fn function_position(&self, nargs: i32) -> Result<usize, RuntimeError> {
        let nargs = nargs.max(0) as usize;
        let stack = self.0.stack.borrow();
        let available = stack.frame_len();
        if available < nargs + 1 {
            return Err(RuntimeError::StackUnderflow {
                needed: nargs + 1,
                available,
            });
        }
        Ok(stack.values.len() - nargs - 1)
    }

    fn call_at(&self, func_pos: usize, nresults: i32) -> Result<(), RuntimeError> {
        let depth = self.0.stack.borrow().frames.len();
        if depth >= self.0.options.max_call_depth {
            self.truncate_to(func_pos);
            return Err(RuntimeError::CallDepthExceeded(
                self.0.options.max_call_depth,
            ));
        }

        let function = match self.resolve_callable(func_pos) {
            Ok(function) => function,
            Err(err) => {
                self.truncate_to(func_pos);
                return Err(err);
            }
        };

        self.0.stack.borrow_mut().frames.push(func_pos + 1);
        let outcome = function.invoke(self);

        let (results, discarded) = {
            let mut stack = self.0.stack.borrow_mut();
            stack.frames.pop();
            let results = match &outcome {
                Ok(count) => {
                    let frame_len = stack.values.len().saturating_sub(func_pos + 1);
                    let count = (*count).min(frame_len);
                    let at = stack.values.len() - count;
                    Some(stack.values.split_off(at))
                }
                Err(_) => None,
            };
            let discarded = if func_pos < stack.values.len() {
                stack.values.split_off(func_pos)
            } else {
                Vec::new()
            };
            (results, discarded)
        };
        drop(discarded);

        outcome?;
        let mut results = results.unwrap_or_default();
        if nresults >= 0 {
            results.resize(nresults as usize, Value::Nil);
        }
        self.0.stack.borrow_mut().values.extend(results);
        Ok(())
    }

    /// The function to invoke for the value at `func_pos`, inserting the
    /// `__call` handler below it when the value is not a function.
    fn resolve_callable(&self, func_pos: usize) -> Result<Function, RuntimeError> {
        let callee = self.0.stack.borrow().values[func_pos].clone();
        if let Value::Function(function) = callee {
            return Ok(function);
        }
        let handler = callee
            .metatable()
            .map(|mt| mt.raw_get_str("__call"))
            .unwrap_or_default();
        match handler {
            Value::Function(function) => {
                self.0
                    .stack
                    .borrow_mut()
                    .values
                    .insert(func_pos, Value::Function(function.clone()));
                Ok(function)
            }
            _ => Err(RuntimeError::NotCallable {
                type_name: callee.type_name(),
            }),
        }
    }
}
