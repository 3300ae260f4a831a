//! 工具层：注册表、参数 schema、带超时与审计的执行器，以及内置工具

pub mod chat_data;
pub mod dice;
pub mod executor;
pub mod registry;
pub mod schema;

pub use chat_data::{ChatDataAction, ChatDataArgs, ChatDataTool};
pub use dice::{roll, DiceError, DiceRoll, RollDiceArgs, RollDiceTool};
pub use executor::ToolExecutor;
pub use registry::{FunctionTool, Tool, ToolContext, ToolError, ToolRegistry};
pub use schema::parameters_schema;
