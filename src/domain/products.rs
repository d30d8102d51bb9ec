use serde::{Deserialize, Serialize};

use super::Entity;

/// Product record mirrored from the `products` table.
///
/// Serialized field names are PascalCase so cached blobs keep the
/// `{"Pid":..,"Name":..,"Describe":..,"SkuId":..}` shape existing readers expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    pub pid: i64,
    pub name: String,
    pub describe: String,
    pub sku_id: i64,
}

impl Entity for Product {
    const NAME: &'static str = "product";

    fn identifier(&self) -> i64 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_pascal_case_fields() {
        let product = Product {
            pid: 42,
            name: "widget".to_string(),
            describe: "a small widget".to_string(),
            sku_id: 7,
        };

        let blob = serde_json::to_string(&product).expect("serialize product");
        assert_eq!(
            blob,
            r#"{"Pid":42,"Name":"widget","Describe":"a small widget","SkuId":7}"#
        );

        let decoded: Product = serde_json::from_str(&blob).expect("deserialize product");
        assert_eq!(decoded, product);
        assert_eq!(decoded.identifier(), 42);
    }
}
