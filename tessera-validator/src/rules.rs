use regex::Regex;

use crate::error::ValidationError;

/// 校验规则
///
/// 每条规则只做判断并返回错误，字段名与原始值由调用方统一填充
pub struct ValidationRules;

impl ValidationRules {
    /// 验证必填：所有值去除空白后都为空即视为未提交
    pub fn required(values: &[String]) -> Option<ValidationError> {
        if values.iter().all(|v| v.trim().is_empty()) {
            return Some(ValidationError::constraint(
                "validation.required.valueNotPresent",
            ));
        }
        None
    }

    /// 验证字符串长度（按字符计数，闭区间）
    pub fn length(value: &str, min: Option<usize>, max: Option<usize>) -> Option<ValidationError> {
        let len = value.chars().count();

        if let Some(min_len) = min {
            if len < min_len {
                return Some(
                    ValidationError::constraint("validation.minlength.valueTooShort")
                        .with_parameter(min_len),
                );
            }
        }

        if let Some(max_len) = max {
            if len > max_len {
                return Some(
                    ValidationError::constraint("validation.maxlength.valueTooLong")
                        .with_parameter(max_len),
                );
            }
        }

        None
    }

    /// 验证数值范围（闭区间），作用于转换后的值
    pub fn range(value: f64, min: Option<f64>, max: Option<f64>) -> Option<ValidationError> {
        if let Some(min_val) = min {
            if value < min_val {
                return Some(
                    ValidationError::constraint("validation.minvalue.valueBelowMinimum")
                        .with_parameter(min_val),
                );
            }
        }

        if let Some(max_val) = max {
            if value > max_val {
                return Some(
                    ValidationError::constraint("validation.maxvalue.valueAboveMaximum")
                        .with_parameter(max_val),
                );
            }
        }

        None
    }

    /// 验证正则表达式（调用方传入已锚定的表达式）
    pub fn pattern(value: &str, regex: &Regex) -> Option<ValidationError> {
        if !regex.is_match(value) {
            return Some(ValidationError::constraint(
                "validation.mask.valueDoesNotMatch",
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_values() {
        assert!(ValidationRules::required(&["   ".to_string()]).is_some());
        assert!(ValidationRules::required(&[]).is_some());
        assert!(ValidationRules::required(&["".to_string(), "x".to_string()]).is_none());
    }

    #[test]
    fn test_length_bounds_are_inclusive() {
        assert!(ValidationRules::length("abcde", Some(5), Some(5)).is_none());
        let short = ValidationRules::length("ab", Some(5), None).unwrap();
        assert_eq!(short.key(), Some("validation.minlength.valueTooShort"));
        assert_eq!(short.parameters(), &["5".to_string()]);
        assert!(ValidationRules::length("héllo", None, Some(5)).is_none());
    }

    #[test]
    fn test_range() {
        assert!(ValidationRules::range(10.0, Some(10.0), Some(20.0)).is_none());
        let above = ValidationRules::range(20.5, None, Some(20.0)).unwrap();
        assert_eq!(above.key(), Some("validation.maxvalue.valueAboveMaximum"));
    }

    #[test]
    fn test_pattern_requires_full_match() {
        let regex = Regex::new("^(?:[0-9]{5})$").unwrap();
        assert!(ValidationRules::pattern("12345", &regex).is_none());
        assert!(ValidationRules::pattern("123456", &regex).is_some());
    }
}
