#![allow(dead_code)]

use std::collections::BTreeMap;

use lazydag::config::model::{CallArg, Join, Program, TaskSpec, TemplateCall};
use lazydag::exec::Runner;

/// Builder for `Program` to simplify test setup.
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            program: Program::default(),
        }
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.program
            .environment
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.program.task.push(task);
        self
    }

    pub fn with_template(mut self, name: &str, template: TaskSpec) -> Self {
        self.program.template.insert(name.to_string(), template);
        self
    }

    pub fn with_call(mut self, call: TemplateCall) -> Self {
        self.program.call.push(call);
        self
    }

    pub fn with_include(mut self, path: &str) -> Self {
        self.program.include.push(path.to_string());
        self
    }

    pub fn with_runner(mut self, name: &str, command: &str, args: &[&str]) -> Self {
        self.program.runner.insert(
            name.to_string(),
            Runner::new(command, args.iter().map(|a| a.to_string()).collect()),
        );
        self
    }

    pub fn build(self) -> Program {
        self.program
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self {
            spec: TaskSpec::default(),
        }
    }

    pub fn creates(mut self, target: &str) -> Self {
        self.spec.creates.push(target.to_string());
        self
    }

    pub fn requires(mut self, target: &str) -> Self {
        self.spec.requires.push(target.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.spec.name = Some(name.to_string());
        self
    }

    pub fn runner(mut self, runner: &str) -> Self {
        self.spec.runner = Some(runner.to_string());
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.spec.path = Some(path.to_string());
        self
    }

    pub fn script(mut self, script: &str) -> Self {
        self.spec.script = Some(script.to_string());
        self
    }

    pub fn stdin(mut self, target: &str) -> Self {
        self.spec.stdin = Some(target.to_string());
        self
    }

    pub fn stdout(mut self, target: &str) -> Self {
        self.spec.stdout = Some(target.to_string());
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.spec.description = Some(text.to_string());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.spec.force = force;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

impl Default for TaskSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TemplateCall`.
pub struct CallBuilder {
    call: TemplateCall,
}

impl CallBuilder {
    pub fn new(template: &str) -> Self {
        Self {
            call: TemplateCall {
                template: template.to_string(),
                args: BTreeMap::new(),
                collect: None,
                join: Join::Inner,
            },
        }
    }

    pub fn arg(mut self, name: &str, value: &str) -> Self {
        self.call
            .args
            .insert(name.to_string(), CallArg::Scalar(value.to_string()));
        self
    }

    pub fn arg_list(mut self, name: &str, values: &[&str]) -> Self {
        self.call.args.insert(
            name.to_string(),
            CallArg::List(values.iter().map(|v| v.to_string()).collect()),
        );
        self
    }

    pub fn collect(mut self, name: &str) -> Self {
        self.call.collect = Some(name.to_string());
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.call.join = join;
        self
    }

    pub fn build(self) -> TemplateCall {
        self.call
    }
}
