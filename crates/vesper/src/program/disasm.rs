use std::fmt::Write;

use super::{Instruction, NONE, Op, Program};

impl Program {
    /// Human-readable listing of every block.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "; module {} (wire v{}), {} words, {} constants",
            self.module_name.as_deref().unwrap_or("<anonymous>"),
            self.wire_version,
            self.heap.len(),
            self.constants.len()
        );
        let _ = writeln!(out, "; symbols: {}", self.symbols.symbols.join(", "));
        if !self.symbols.named_args.is_empty() {
            let _ = writeln!(out, "; args: @{}", self.symbols.named_args.join(", @"));
        }

        for (index, info) in self.blocks() {
            let marker = if index == self.main { " (main)" } else { "" };
            let params: Vec<String> = info
                .parameters
                .iter()
                .map(|&slot| self.symbol_name(slot))
                .collect();
            let _ = writeln!(
                out,
                "\nblock c{index}{marker} [{}..{}] |{}|",
                info.start,
                info.end().map_or_else(|| "?".to_string(), |end| end.to_string()),
                params.join(" ")
            );
            match self.instructions(index) {
                Ok(instructions) => {
                    for (pc, instruction) in instructions {
                        let relative = pc - info.start as usize;
                        let _ = writeln!(
                            out,
                            "  {relative:04}  {:<22} {}",
                            instruction.op.name(),
                            self.describe(&instruction)
                        );
                    }
                }
                Err(err) => {
                    let _ = writeln!(out, "  <{err}>");
                }
            }
        }
        out
    }

    fn symbol_name(&self, slot: u32) -> String {
        self.symbols
            .symbols
            .get(slot as usize)
            .map_or_else(|| format!("${slot}"), |name| format!("${slot}:{name}"))
    }

    fn string_operand(&self, index: u32) -> String {
        if index == NONE {
            return "-".to_string();
        }
        self.constants
            .string(index)
            .map_or_else(|_| format!("c{index}?"), |s| format!("{s:?}"))
    }

    fn names_operand(&self, index: u32) -> String {
        match self.constants.names_or_empty(index) {
            Ok(names) => format!("[{}]", names.join(" ")),
            Err(_) => format!("c{index}?"),
        }
    }

    fn describe(&self, instruction: &Instruction) -> String {
        let [a, b, c] = instruction.operands;
        let pool = &self.constants;
        match instruction.op {
            Op::PushConstant => pool
                .literal(a)
                .map_or_else(|_| format!("c{a}?"), |literal| format!("{literal:?}")),
            Op::GetSymbol => self.symbol_name(a),
            Op::GetArg => format!("@{}", pool.string(a).map_or("?", String::as_str)),
            Op::GetProperty | Op::HasBlock | Op::Text | Op::Comment => self.string_operand(a),
            Op::CallHelper => format!(
                "{} positional={b} named={}",
                pool.helper(a).map_or("?", |s| s.name.as_str()),
                self.names_operand(c)
            ),
            Op::CallDynamicHelper => format!("positional={a} named={}", self.names_operand(b)),
            Op::Concat | Op::ArrayLiteral => format!("count={a}"),
            Op::HashLiteral => self.names_operand(a),
            Op::OpenElement => format!("<{}> ns={}", pool.string(a).map_or("?", String::as_str), self.string_operand(b)),
            Op::StaticAttr => format!(
                "{}={} ns={}",
                self.string_operand(a),
                self.string_operand(b),
                self.string_operand(c)
            ),
            Op::DynamicAttr | Op::TrustingDynamicAttr => {
                format!("{} ns={}", self.string_operand(a), self.string_operand(b))
            }
            Op::Modifier => format!(
                "{} positional={b} named={}",
                pool.modifier(a).map_or("?", |s| s.name.as_str()),
                self.names_operand(c)
            ),
            Op::Jump | Op::JumpUnless => format!("-> {a:04}"),
            Op::EnterTry => format!("c{a}"),
            Op::InvokeBlock => format!("c{a} argc={b}"),
            Op::Each => {
                let otherwise = if b == NONE { "-".to_string() } else { format!("c{b}") };
                format!("c{a} else={otherwise} key={}", self.string_operand(c))
            }
            Op::Yield => format!("to={} argc={b}", self.string_operand(a)),
            Op::InvokeComponent => {
                let layout = pool.invocation(c).ok();
                format!(
                    "{} positional={b} named=[{}] blocks=[{}]",
                    pool.component(a).map_or("?", |s| s.name.as_str()),
                    layout.map(|l| l.named.join(" ")).unwrap_or_default(),
                    layout
                        .map(|l| l
                            .blocks
                            .iter()
                            .map(|(name, block)| format!("{name}:c{block}"))
                            .collect::<Vec<_>>()
                            .join(" "))
                        .unwrap_or_default()
                )
            }
            Op::InvokeDynamicComponent => format!("positional={a} layout=c{b}"),
            Op::GetDynamicProperty
            | Op::Not
            | Op::IfInline
            | Op::Eq
            | Op::Pop
            | Op::Dup
            | Op::AppendText
            | Op::AppendHtml
            | Op::FlushElement
            | Op::CloseElement
            | Op::Return => String::new(),
        }
    }
}
