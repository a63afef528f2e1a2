use std::io::BufRead;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use evm_stepper::codec::{bytes_to_hex, hex_to_bytes, parse_word};
use evm_stepper::{
    create_address, disasm, AccountRegistry, BlockEnv, EvmConfig, EvmError, ExecutionContext, ExecutionResult,
    Message, Step, StepSignal, Transaction,
};
use primitive_types::U256;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "evm", about = "Stepping EVM interpreter")]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. "debug", "evm_stepper=trace")
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run EVM bytecode
    Run {
        /// Hex bytecode (e.g., 0x6001600101) or @file
        code: String,
        #[command(flatten)]
        env: EnvArgs,
        /// Print full stack
        #[arg(long)]
        dump_stack: bool,
        /// Dump the world JSON after committing the run's storage, to stdout or @file
        #[arg(long)]
        dump_world: Option<Option<String>>,
    },
    /// Disassemble bytecode
    Disasm {
        /// Hex bytecode or @file
        code: String,
    },
    /// Step-through trace
    Trace {
        /// Hex bytecode or @file
        code: String,
        #[command(flatten)]
        env: EnvArgs,
        /// Print each step as a JSON line
        #[arg(long)]
        json: bool,
        /// Wait for Enter before every instruction ("q" cancels)
        #[arg(long)]
        interactive: bool,
        /// Pause after every step, in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
        /// Max steps before the run is cancelled
        #[arg(long, default_value_t = 10_000)]
        max_steps: usize,
    },
    /// Run init code and install the returned code at a derived address
    Deploy {
        /// Hex init code or @file
        code: String,
        #[command(flatten)]
        env: EnvArgs,
        /// Deploying account (0x.. or decimal); defaults to --caller
        #[arg(long)]
        sender: Option<String>,
        /// Dump world JSON to stdout or @file
        #[arg(long)]
        dump_world: Option<Option<String>>,
    },
    /// Derive a contract address from a sender and nonce
    CreateAddress {
        sender: String,
        #[arg(default_value = "0")]
        nonce: String,
    },
}

#[derive(Debug, Args)]
struct EnvArgs {
    /// Calldata as hex
    #[arg(long, default_value = "0x")]
    calldata: String,
    /// World JSON file (accounts map)
    #[arg(long)]
    world: Option<String>,
    /// Engine config JSON file
    #[arg(long)]
    config: Option<String>,
    /// Gas limit; unset means gas is metered but not enforced
    #[arg(long)]
    gas_limit: Option<u64>,
    /// Reject jumps that do not land on a JUMPDEST
    #[arg(long)]
    validate_jumps: bool,
    /// Executing account address (0x.. or decimal)
    #[arg(long, default_value = "0x0")]
    address: String,
    /// Msg caller
    #[arg(long, default_value = "0x0")]
    caller: String,
    /// Tx origin
    #[arg(long, default_value = "0x0")]
    origin: String,
    /// Call value (0x.. or decimal)
    #[arg(long, default_value = "0x0")]
    value: String,
    /// Gas price (0x.. or decimal)
    #[arg(long, default_value = "0x0")]
    gas_price: String,
    /// Block coinbase
    #[arg(long, default_value = "0x0")]
    coinbase: String,
    /// Block timestamp
    #[arg(long, default_value = "0")]
    timestamp: String,
    /// Block number
    #[arg(long, default_value = "0")]
    number: String,
    /// Block difficulty
    #[arg(long, default_value = "0")]
    difficulty: String,
    /// Block gas limit
    #[arg(long, default_value = "0")]
    block_gas_limit: String,
    /// Block base fee
    #[arg(long, default_value = "0")]
    basefee: String,
    /// Chain id
    #[arg(long, default_value = "1")]
    chainid: String,
}

/// Everything a run needs, resolved from the command line.
struct Setup {
    ctx: ExecutionContext,
    registry: AccountRegistry,
    config: EvmConfig,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    match cli.cmd {
        Cmd::Run { code, env, dump_stack, dump_world } => run_cmd(&code, &env, dump_stack, dump_world),
        Cmd::Disasm { code } => disasm_cmd(&code),
        Cmd::Trace { code, env, json, interactive, delay_ms, max_steps } => {
            trace_cmd(&code, &env, json, interactive, delay_ms, max_steps)
        }
        Cmd::Deploy { code, env, sender, dump_world } => deploy_cmd(&code, &env, sender.as_deref(), dump_world),
        Cmd::CreateAddress { sender, nonce } => {
            let address = create_address(word_arg(&sender, "sender"), word_arg(&nonce, "nonce"));
            println!("0x{:x}", address);
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();
}

fn run_cmd(code_arg: &str, env: &EnvArgs, dump_stack: bool, dump_world: Option<Option<String>>) {
    let code = read_code_arg(code_arg);
    let Setup { ctx, mut registry, config } = setup(env);
    match evm_stepper::run(&code, &ctx, &registry, config, &mut evm_stepper::NoopObserver) {
        Ok(result) => {
            print_result(&result);
            if dump_stack {
                for (i, v) in result.stack.as_slice().iter().rev().enumerate() {
                    println!("[{}] 0x{:x}", i, v);
                }
            }
            if let Some(dw) = dump_world {
                registry.commit(ctx.address(), &result);
                write_world(&registry, dw);
            }
        }
        Err(e) => die(&format!("Execution error: {e}")),
    }
}

fn disasm_cmd(code_arg: &str) {
    let code = read_code_arg(code_arg);
    for line in disasm::disassemble(&code) {
        println!("{}", line);
    }
}

fn trace_cmd(code_arg: &str, env: &EnvArgs, json: bool, interactive: bool, delay_ms: u64, max_steps: usize) {
    let code = read_code_arg(code_arg);
    let Setup { ctx, registry, config } = setup(env);
    let stdin = std::io::stdin();
    let mut seen = 0usize;

    let mut observer = |step: &Step<'_>| {
        if json {
            let line = serde_json::to_string(&step.snapshot()).unwrap_or_else(|e| die(&format!("encode step: {e}")));
            println!("{}", line);
        } else {
            println!(
                "pc={:04x} op={:<14} gas={:<8} stack={:2} top={}",
                step.pc,
                evm_stepper::opcodes::mnemonic(step.opcode).unwrap_or("?"),
                step.gas_used,
                step.stack.len(),
                step.stack.top().map(|v| format!("0x{:x}", v)).unwrap_or_else(|| "-".to_string()),
            );
        }
        if step.is_final {
            return StepSignal::Continue;
        }
        seen += 1;
        if seen >= max_steps {
            return StepSignal::Cancel;
        }
        if delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(delay_ms));
        }
        if interactive {
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 || line.trim() == "q" {
                return StepSignal::Cancel;
            }
        }
        StepSignal::Continue
    };

    match evm_stepper::run(&code, &ctx, &registry, config, &mut observer) {
        Ok(result) => {
            println!("-- halt: {} --", result.halt.as_str());
            if !result.output.is_empty() {
                println!("{}: {}", output_label(&result), bytes_to_hex(&result.output));
            }
            println!("gas used: {}", result.gas_used);
        }
        Err(EvmError::Cancelled(pc)) => println!("-- cancelled at pc={:04x} --", pc),
        Err(e) => die(&format!("step error: {e}")),
    }
}

fn deploy_cmd(code_arg: &str, env: &EnvArgs, sender: Option<&str>, dump_world: Option<Option<String>>) {
    let init = read_code_arg(code_arg);
    let Setup { mut ctx, mut registry, config } = setup(env);
    let sender = sender.map(|s| word_arg(s, "sender")).unwrap_or(ctx.message.caller);
    let nonce = registry.get_account(sender).nonce;
    let address = create_address(sender, nonce);

    ctx.account = registry.get_account(address);
    ctx.message.caller = sender;
    let result = evm_stepper::run(&init, &ctx, &registry, config, &mut evm_stepper::NoopObserver)
        .unwrap_or_else(|e| die(&format!("Execution error: {e}")));
    if !result.halt.is_success() {
        die(&format!("deployment reverted: {}", bytes_to_hex(&result.output)));
    }

    registry.create_account(address);
    registry.commit(address, &result);
    registry
        .set_code(address, result.output.clone())
        .unwrap_or_else(|e| die(&format!("install code: {e}")));
    println!("address: 0x{:x}", address);
    println!("code: {}", bytes_to_hex(&result.output));
    println!("gas used: {}", result.gas_used);
    if let Some(dw) = dump_world {
        write_world(&registry, dw);
    }
}

fn setup(env: &EnvArgs) -> Setup {
    let mut config = match &env.config {
        Some(path) => EvmConfig::from_json_file(path).unwrap_or_else(|e| die(&e.to_string())),
        None => EvmConfig::default(),
    };
    if env.gas_limit.is_some() {
        config.gas_limit = env.gas_limit;
    }
    if env.validate_jumps {
        config.validate_jumps = true;
    }

    let registry = match &env.world {
        Some(path) => {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| die(&format!("read world: {e}")));
            AccountRegistry::from_json(&text).unwrap_or_else(|e| die(&format!("parse world json: {e}")))
        }
        None => AccountRegistry::new(),
    };

    let calldata = hex_to_bytes(&env.calldata).unwrap_or_else(|_| die("Invalid calldata hex"));
    let mut ctx = ExecutionContext::for_account(registry.get_account(word_arg(&env.address, "address"))).with_message(
        Message {
            caller: word_arg(&env.caller, "caller"),
            value: word_arg(&env.value, "value"),
            data: calldata,
        },
    );
    ctx.transaction = Transaction {
        origin: word_arg(&env.origin, "origin"),
        gas_price: word_arg(&env.gas_price, "gas-price"),
    };
    ctx.block = BlockEnv {
        coinbase: word_arg(&env.coinbase, "coinbase"),
        timestamp: word_arg(&env.timestamp, "timestamp"),
        number: word_arg(&env.number, "number"),
        difficulty: word_arg(&env.difficulty, "difficulty"),
        gas_limit: word_arg(&env.block_gas_limit, "block-gas-limit"),
        basefee: word_arg(&env.basefee, "basefee"),
    };
    ctx.chain_id = word_arg(&env.chainid, "chainid");
    Setup { ctx, registry, config }
}

fn print_result(result: &ExecutionResult) {
    println!("halted: {}", result.halt.as_str());
    if !result.output.is_empty() {
        println!("{}: {}", output_label(result), bytes_to_hex(&result.output));
    }
    println!("pc: {}", result.pc);
    println!("gas used: {}", result.gas_used);
    println!("stack size: {}", result.stack.len());
    if let Some(top) = result.stack.top() {
        println!("top: 0x{:x}", top);
    }
}

fn output_label(result: &ExecutionResult) -> &'static str {
    if result.halt.is_success() {
        "return"
    } else {
        "revert"
    }
}

fn write_world(registry: &AccountRegistry, target: Option<String>) {
    let json = registry.to_json().unwrap_or_else(|e| die(&format!("encode world: {e}")));
    match target.as_deref().and_then(|t| t.strip_prefix('@')) {
        Some(path) => std::fs::write(path, json).unwrap_or_else(|e| die(&format!("write world: {e}"))),
        None => println!("{}", json),
    }
}

fn read_code_arg(arg: &str) -> Vec<u8> {
    if let Some(rest) = arg.strip_prefix('@') {
        std::fs::read(rest).unwrap_or_else(|e| die(&format!("Failed to read file: {e}")))
    } else {
        hex_to_bytes(arg).unwrap_or_else(|_| die("Invalid code hex"))
    }
}

fn word_arg(s: &str, flag: &str) -> U256 {
    parse_word(s).unwrap_or_else(|e| die(&format!("Invalid --{flag}: {e}")))
}

fn die(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}
