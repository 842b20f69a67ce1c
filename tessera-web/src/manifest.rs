//! 字段清单
//!
//! 页面渲染时把出现在表单里的字段名写入隐藏参数，提交时据此限定向导流程的必填检查。
//! 清单值对客户端不透明；加密不在本模块范围内，由 [`FieldManifestCodec`] 的实现决定。

/// 字段清单编解码
pub trait FieldManifestCodec: Send + Sync {
    fn encode(&self, fields: &[&str]) -> String;

    /// 无法解码时返回 `None`
    fn decode(&self, value: &str) -> Option<Vec<String>>;
}

/// 以分隔符连接字段名的明文编码
#[derive(Debug, Clone)]
pub struct DelimitedManifestCodec {
    delimiter: String,
}

impl DelimitedManifestCodec {
    pub const DEFAULT_DELIMITER: &'static str = "||";

    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

impl Default for DelimitedManifestCodec {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELIMITER)
    }
}

impl FieldManifestCodec for DelimitedManifestCodec {
    fn encode(&self, fields: &[&str]) -> String {
        fields.join(&self.delimiter)
    }

    fn decode(&self, value: &str) -> Option<Vec<String>> {
        if self.delimiter.is_empty() {
            return None;
        }

        let fields: Vec<String> = value
            .split(self.delimiter.as_str())
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();

        if fields.is_empty() {
            None
        } else {
            Some(fields)
        }
    }
}
