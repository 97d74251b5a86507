//! 按调用方提供的 JSON ABI 调用任意合约函数
//!
//! 参数按 ABI 声明的类型逐个转换，类型或数量不符一律返回 InvalidInput。
//! view/pure 函数走 eth_call，其余函数签名后提交。

use super::parse_recipient;
use crate::engine::TradingEngine;
use crate::erc20::parse_units;
use crate::error::{Result, TradingError};
use crate::token_registry::parse_address;
use crate::types::{ContractCall, TxReference};
use ethers::abi::{Abi, Function, ParamType, StateMutability, Token};
use ethers::types::{Bytes, I256, U256};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Serialize)]
pub struct ContractCallOutcome {
    pub function: String,
    pub signature: String,
    pub read_only: bool,
    /// 只读调用的解码结果
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx: Option<TxReference>,
}

/// 一次合约调用请求
#[derive(Debug, Clone, Default)]
pub struct ContractCallRequest {
    pub abi: String,
    pub contract: String,
    pub function: String,
    /// JSON 数组，或内容为 JSON 数组的字符串
    pub args: Value,
    /// 随交易发送的原生代币数量（BNB）
    pub value: Option<String>,
}

impl TradingEngine {
    #[instrument(skip(self, request), fields(function = %request.function, contract = %request.contract))]
    pub async fn call_contract(&self, request: &ContractCallRequest) -> Result<ContractCallOutcome> {
        let contract = parse_recipient(&request.contract)?;
        let abi: Abi = serde_json::from_str(&request.abi)
            .map_err(|e| TradingError::invalid(format!("ABI 解析失败: {}", e)))?;
        let function = find_function(&abi, &request.function)?;
        for param in function.inputs.iter().chain(&function.outputs) {
            check_kind(&param.kind).map_err(|e| {
                TradingError::invalid(format!("参数 {} 的类型 {} 无效: {}", param.name, param.kind, e))
            })?;
        }

        let args = argument_list(&request.args)?;
        if args.len() != function.inputs.len() {
            return Err(TradingError::invalid(format!(
                "{} 需要 {} 个参数，实际提供 {} 个",
                function.name,
                function.inputs.len(),
                args.len()
            )));
        }
        let tokens = function
            .inputs
            .iter()
            .zip(&args)
            .map(|(param, value)| {
                coerce(&param.kind, value).map_err(|e| {
                    TradingError::invalid(format!("参数 {} ({}) 无效: {}", param.name, param.kind, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let data = function
            .encode_input(&tokens)
            .map_err(|e| TradingError::invalid(format!("参数编码失败: {}", e)))?;

        let value = match request.value.as_deref().map(str::trim) {
            None | Some("") => U256::zero(),
            Some(amount) => parse_units(amount, NATIVE_DECIMALS)?,
        };
        let read_only = matches!(
            function.state_mutability,
            StateMutability::View | StateMutability::Pure
        );
        if !value.is_zero() && function.state_mutability != StateMutability::Payable {
            return Err(TradingError::invalid(format!(
                "{} 不是 payable 函数，不能附带原生代币",
                function.name
            )));
        }

        let signature = signature(function);
        if read_only {
            let output = self.rpc().call(contract, Bytes::from(data)).await?;
            let decoded = function.decode_output(output.as_ref()).map_err(|e| {
                TradingError::Abi(format!("{} 返回值解码失败: {}", function.name, e))
            })?;
            debug!(outputs = decoded.len(), "只读调用完成");
            return Ok(ContractCallOutcome {
                function: function.name.clone(),
                signature,
                read_only,
                result: Some(outputs_to_json(decoded)),
                tx: None,
            });
        }

        let call = ContractCall::new(contract, data, "call_contract").with_value(value);
        let tx = self.submitter()?.execute(&call).await?;
        info!(signature = %signature, tx_hash = ?tx.hash, "合约调用已确认");

        Ok(ContractCallOutcome {
            function: function.name.clone(),
            signature,
            read_only,
            result: None,
            tx: Some(tx),
        })
    }
}

/// 按名称查找唯一的函数定义
fn find_function<'a>(abi: &'a Abi, name: &str) -> Result<&'a Function> {
    let candidates = abi
        .functions_by_name(name)
        .map_err(|_| TradingError::invalid(format!("ABI 中没有函数 {}", name)))?;
    match candidates.as_slice() {
        [function] => Ok(function),
        overloads => Err(TradingError::invalid(format!(
            "函数 {} 有 {} 个重载，无法确定调用哪一个",
            name,
            overloads.len()
        ))),
    }
}

/// name(type1,type2)
fn signature(function: &Function) -> String {
    let kinds: Vec<String> = function.inputs.iter().map(|param| param.kind.to_string()).collect();
    format!("{}({})", function.name, kinds.join(","))
}

fn argument_list(args: &Value) -> Result<Vec<Value>> {
    match args {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        Value::String(text) if text.trim().is_empty() => Ok(Vec::new()),
        Value::String(text) => match serde_json::from_str(text) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(TradingError::invalid("参数必须是 JSON 数组")),
        },
        _ => Err(TradingError::invalid("参数必须是 JSON 数组")),
    }
}

/// 整数宽度必须是 8 的倍数且在 8..=256 之间，定长字节在 1..=32 之间
fn check_kind(kind: &ParamType) -> std::result::Result<(), String> {
    match kind {
        ParamType::Uint(bits) | ParamType::Int(bits) => {
            if *bits == 0 || *bits > 256 || *bits % 8 != 0 {
                return Err(format!("不支持的整数宽度 {}", bits));
            }
            Ok(())
        }
        ParamType::FixedBytes(size) if *size == 0 || *size > 32 => {
            Err(format!("不支持的定长字节 {}", size))
        }
        ParamType::Array(inner) | ParamType::FixedArray(inner, _) => check_kind(inner),
        ParamType::Tuple(kinds) => kinds.iter().try_for_each(check_kind),
        _ => Ok(()),
    }
}

/// JSON 值 → ABI Token
fn coerce(kind: &ParamType, value: &Value) -> std::result::Result<Token, String> {
    match kind {
        ParamType::Address => {
            let text = value.as_str().ok_or("需要地址字符串")?;
            parse_address(text.trim())
                .map(Token::Address)
                .ok_or_else(|| format!("无效的地址: {}", text))
        }
        ParamType::Uint(bits) => {
            check_kind(kind)?;
            let number = parse_uint(value)?;
            if *bits < 256 && number >= (U256::one() << *bits) {
                return Err(format!("超出 uint{} 范围", bits));
            }
            Ok(Token::Uint(number))
        }
        ParamType::Int(bits) => {
            check_kind(kind)?;
            let number = parse_int(value)?;
            if *bits < 256 {
                let limit = U256::one() << (*bits - 1);
                let magnitude = number.unsigned_abs();
                let fits = if number.is_negative() {
                    magnitude <= limit
                } else {
                    magnitude < limit
                };
                if !fits {
                    return Err(format!("超出 int{} 范围", bits));
                }
            }
            Ok(Token::Int(number.into_raw()))
        }
        ParamType::Bool => match value {
            Value::Bool(flag) => Ok(Token::Bool(*flag)),
            Value::String(text) => match text.trim() {
                "true" => Ok(Token::Bool(true)),
                "false" => Ok(Token::Bool(false)),
                other => Err(format!("无效的布尔值: {}", other)),
            },
            _ => Err("需要布尔值".to_string()),
        },
        ParamType::String => value
            .as_str()
            .map(|text| Token::String(text.to_string()))
            .ok_or_else(|| "需要字符串".to_string()),
        ParamType::Bytes => parse_bytes(value).map(Token::Bytes),
        ParamType::FixedBytes(size) => {
            let bytes = parse_bytes(value)?;
            if bytes.len() != *size {
                return Err(format!("需要 {} 字节，实际 {} 字节", size, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Array(inner) => {
            let items = value.as_array().ok_or("需要数组")?;
            items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Token::Array)
        }
        ParamType::FixedArray(inner, size) => {
            let items = value.as_array().ok_or("需要数组")?;
            if items.len() != *size {
                return Err(format!("需要 {} 个元素，实际 {} 个", size, items.len()));
            }
            items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Token::FixedArray)
        }
        ParamType::Tuple(kinds) => {
            let items = value.as_array().ok_or("元组需要以数组形式提供")?;
            if items.len() != kinds.len() {
                return Err(format!("元组需要 {} 个字段，实际 {} 个", kinds.len(), items.len()));
            }
            kinds
                .iter()
                .zip(items)
                .map(|(kind, item)| coerce(kind, item))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Token::Tuple)
        }
    }
}

fn parse_uint(value: &Value) -> std::result::Result<U256, String> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("无效的无符号整数: {}", number)),
        Value::String(text) => {
            let text = text.trim();
            match text.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
                None => U256::from_dec_str(text).map_err(|e| e.to_string()),
            }
        }
        _ => Err("需要整数".to_string()),
    }
}

fn parse_int(value: &Value) -> std::result::Result<I256, String> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(I256::from)
            .ok_or_else(|| format!("无效的整数: {}", number)),
        Value::String(text) => I256::from_dec_str(text.trim()).map_err(|e| e.to_string()),
        _ => Err("需要整数".to_string()),
    }
}

fn parse_bytes(value: &Value) -> std::result::Result<Vec<u8>, String> {
    let text = value.as_str().ok_or("需要十六进制字符串")?;
    text.trim()
        .parse::<Bytes>()
        .map(|bytes| bytes.to_vec())
        .map_err(|e| format!("无效的十六进制数据: {}", e))
}

/// 单个返回值直接展开，多个返回值组成数组
fn outputs_to_json(tokens: Vec<Token>) -> Value {
    let mut values: Vec<Value> = tokens.into_iter().map(token_to_json).collect();
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

fn token_to_json(token: Token) -> Value {
    match token {
        Token::Address(address) => Value::String(format!("{:?}", address)),
        Token::Uint(number) => Value::String(number.to_string()),
        Token::Int(raw) => Value::String(I256::from_raw(raw).to_string()),
        Token::Bool(flag) => Value::Bool(flag),
        Token::String(text) => Value::String(text),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => Value::String(Bytes::from(bytes).to_string()),
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.into_iter().map(token_to_json).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockChain, SIGNER, one_ether};
    use ethers::types::Address;
    use serde_json::json;

    const ERC20_ABI: &str = r#"[
        {"type":"function","name":"balanceOf","stateMutability":"view",
         "inputs":[{"name":"account","type":"address"}],
         "outputs":[{"name":"","type":"uint256"}]},
        {"type":"function","name":"transfer","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"safeTransferFrom","stateMutability":"nonpayable",
         "inputs":[{"name":"from","type":"address"},{"name":"to","type":"address"},{"name":"id","type":"uint256"}],
         "outputs":[]},
        {"type":"function","name":"safeTransferFrom","stateMutability":"nonpayable",
         "inputs":[{"name":"from","type":"address"},{"name":"to","type":"address"},{"name":"id","type":"uint256"},{"name":"data","type":"bytes"}],
         "outputs":[]}
    ]"#;

    const RECIPIENT: &str = "0x3333333333333333333333333333333333333333";

    fn request(contract: Address, function: &str, args: Value) -> ContractCallRequest {
        ContractCallRequest {
            abi: ERC20_ABI.to_string(),
            contract: format!("{:?}", contract),
            function: function.to_string(),
            args,
            value: None,
        }
    }

    #[tokio::test]
    async fn test_view_call_decodes_output() {
        let chain = MockChain::new();
        let usdt = chain.add_token("USDT", "Tether USD", 18);
        chain.set_balance(usdt, SIGNER, one_ether() * 7);
        let engine = testing::engine(&chain);

        let outcome = engine
            .call_contract(&request(usdt, "balanceOf", json!([format!("{:?}", SIGNER)])))
            .await
            .unwrap();
        assert!(outcome.read_only);
        assert_eq!(outcome.signature, "balanceOf(address)");
        assert_eq!(outcome.result, Some(json!("7000000000000000000")));
        assert!(chain.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_write_call_is_submitted() {
        let chain = MockChain::new();
        let usdt = chain.add_token("USDT", "Tether USD", 18);
        chain.set_balance(usdt, SIGNER, one_ether() * 7);
        let engine = testing::engine(&chain);

        // 参数也可以是字符串形式的 JSON 数组
        let args = Value::String(format!(r#"["{}", "0x{:x}"]"#, RECIPIENT, one_ether() * 2));
        let outcome = engine.call_contract(&request(usdt, "transfer", args)).await.unwrap();
        assert!(!outcome.read_only);
        assert!(outcome.tx.is_some());

        let recipient: Address = RECIPIENT.parse().unwrap();
        assert_eq!(chain.balance(usdt, recipient), one_ether() * 2);
    }

    #[tokio::test]
    async fn test_call_rejects_mismatches() {
        let chain = MockChain::new();
        let usdt = chain.add_token("USDT", "Tether USD", 18);
        let engine = testing::engine(&chain);

        let cases = [
            request(usdt, "balanceOf", json!([])),
            request(usdt, "balanceOf", json!(["not-an-address"])),
            request(usdt, "transfer", json!([RECIPIENT, "-1"])),
            request(usdt, "mint", json!([])),
            request(usdt, "safeTransferFrom", json!([RECIPIENT, RECIPIENT, 1])),
        ];
        for case in &cases {
            assert!(
                matches!(engine.call_contract(case).await, Err(TradingError::InvalidInput(_))),
                "{} 应被拒绝",
                case.function
            );
        }

        let mut paid = request(usdt, "transfer", json!([RECIPIENT, 1]));
        paid.value = Some("0.1".to_string());
        assert!(matches!(
            engine.call_contract(&paid).await,
            Err(TradingError::InvalidInput(_))
        ));

        let mut broken = request(usdt, "balanceOf", json!([]));
        broken.abi = "{not json".to_string();
        assert!(matches!(
            engine.call_contract(&broken).await,
            Err(TradingError::InvalidInput(_))
        ));
        assert!(chain.sent_transactions().is_empty());
    }

    #[test]
    fn test_coerce_numeric_bounds() {
        assert_eq!(coerce(&ParamType::Uint(8), &json!(255)), Ok(Token::Uint(U256::from(255))));
        assert!(coerce(&ParamType::Uint(8), &json!(256)).is_err());
        assert_eq!(
            coerce(&ParamType::Uint(256), &json!("0xff")),
            Ok(Token::Uint(U256::from(255)))
        );
        assert!(coerce(&ParamType::Int(8), &json!(-128)).is_ok());
        assert!(coerce(&ParamType::Int(8), &json!(-129)).is_err());
        assert!(coerce(&ParamType::Int(8), &json!(128)).is_err());
        assert_eq!(
            coerce(&ParamType::Int(24), &json!("-2250")),
            Ok(Token::Int(I256::from(-2250).into_raw()))
        );
    }

    #[tokio::test]
    async fn test_malformed_integer_widths_are_rejected() {
        let chain = MockChain::new();
        let usdt = chain.add_token("USDT", "Tether USD", 18);
        let engine = testing::engine(&chain);

        for kind in ["int0", "uint7", "uint264", "int0[]", "bytes33"] {
            let abi = format!(
                r#"[{{"type":"function","name":"poke","stateMutability":"nonpayable",
                    "inputs":[{{"name":"x","type":"{}"}}],"outputs":[]}}]"#,
                kind
            );
            let call = ContractCallRequest {
                abi,
                contract: format!("{:?}", usdt),
                function: "poke".to_string(),
                args: json!(["0"]),
                value: None,
            };
            assert!(
                matches!(engine.call_contract(&call).await, Err(TradingError::InvalidInput(_))),
                "{} 应被拒绝",
                kind
            );
        }
        assert!(chain.sent_transactions().is_empty());
    }

    #[test]
    fn test_coerce_rejects_zero_width_integers() {
        assert!(coerce(&ParamType::Int(0), &json!(0)).is_err());
        assert!(coerce(&ParamType::Uint(0), &json!(0)).is_err());
        assert!(coerce(&ParamType::Int(12), &json!(1)).is_err());
        assert!(coerce(&ParamType::Uint(512), &json!(1)).is_err());
        assert!(coerce(&ParamType::Int(256), &json!("-1")).is_ok());
    }

    #[test]
    fn test_coerce_composites() {
        let kind = ParamType::Tuple(vec![
            ParamType::Bool,
            ParamType::FixedBytes(2),
            ParamType::Array(Box::new(ParamType::Address)),
        ]);
        let value = json!(["true", "0xabcd", [RECIPIENT]]);
        let token = coerce(&kind, &value).unwrap();
        assert_eq!(
            token,
            Token::Tuple(vec![
                Token::Bool(true),
                Token::FixedBytes(vec![0xab, 0xcd]),
                Token::Array(vec![Token::Address(RECIPIENT.parse().unwrap())]),
            ])
        );
        assert!(coerce(&ParamType::FixedBytes(4), &json!("0xabcd")).is_err());
        assert!(coerce(&ParamType::FixedArray(Box::new(ParamType::Bool), 2), &json!([true])).is_err());
    }

    #[test]
    fn test_outputs_to_json() {
        assert_eq!(outputs_to_json(vec![Token::Bool(true)]), json!(true));
        assert_eq!(
            outputs_to_json(vec![
                Token::Int(I256::from(-5).into_raw()),
                Token::Bytes(vec![0x01, 0x02]),
            ]),
            json!(["-5", "0x0102"])
        );
    }
}
