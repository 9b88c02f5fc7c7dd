// Type signatures and reference assignability

use crate::error::EvalResult;
use crate::remote::RemoteVm;
use crate::value::PrimitiveKind;
use std::collections::HashSet;

pub const OBJECT: &str = "Ljava/lang/Object;";
pub const STRING: &str = "Ljava/lang/String;";
const CLONEABLE: &str = "Ljava/lang/Cloneable;";
const SERIALIZABLE: &str = "Ljava/io/Serializable;";

/// Source-level name of a type signature:
/// `Ljava/util/Map$Entry;` → `java.util.Map$Entry`, `[I` → `int[]`
pub fn type_name(signature: &str) -> String {
    if let Some(component) = signature.strip_prefix('[') {
        return format!("{}[]", type_name(component));
    }
    if let Some(kind) = PrimitiveKind::from_signature(signature) {
        return kind.name().to_string();
    }
    if signature == "V" {
        return "void".to_string();
    }
    signature
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(signature)
        .replace('/', ".")
}

pub fn is_primitive(signature: &str) -> bool {
    PrimitiveKind::from_signature(signature).is_some()
}

/// Whether a value of reference type `from` may be stored where `to` is
/// declared (JLS 5.2, reference widening)
pub async fn is_assignable(vm: &dyn RemoteVm, from: &str, to: &str) -> EvalResult<bool> {
    let mut from = from;
    let mut to = to;
    while let (Some(f), Some(t)) = (from.strip_prefix('['), to.strip_prefix('[')) {
        from = f;
        to = t;
    }

    if from == to {
        return Ok(true);
    }
    if is_primitive(from) || is_primitive(to) {
        return Ok(false);
    }
    if from.starts_with('[') {
        return Ok(matches!(to, OBJECT | CLONEABLE | SERIALIZABLE));
    }
    if to.starts_with('[') {
        return Ok(false);
    }
    if to == OBJECT {
        return Ok(true);
    }

    let mut pending = vec![from.to_string()];
    let mut seen = HashSet::new();
    while let Some(signature) = pending.pop() {
        if signature == to {
            return Ok(true);
        }
        if seen.insert(signature.clone()) {
            pending.extend(vm.supertypes(&signature).await?);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClass, MockVm};

    #[test]
    fn test_type_names() {
        assert_eq!(type_name("Ljava/lang/String;"), "java.lang.String");
        assert_eq!(type_name("[[I"), "int[][]");
        assert_eq!(type_name("[Ljava/util/Map$Entry;"), "java.util.Map$Entry[]");
        assert_eq!(type_name("V"), "void");
    }

    #[tokio::test]
    async fn test_assignability_walks_hierarchy() {
        let vm = MockVm::new();
        vm.add_class(MockClass::new("Ljava/util/List;").interface());
        vm.add_class(MockClass::new("Ljava/util/RandomAccess;").interface());
        vm.add_class(
            MockClass::new("Ljava/util/AbstractList;")
                .superclass(OBJECT)
                .implements("Ljava/util/List;"),
        );
        vm.add_class(
            MockClass::new("Ljava/util/ArrayList;")
                .superclass("Ljava/util/AbstractList;")
                .implements("Ljava/util/RandomAccess;"),
        );

        assert!(is_assignable(&vm, "Ljava/util/ArrayList;", "Ljava/util/List;").await.unwrap());
        assert!(is_assignable(&vm, "Ljava/util/ArrayList;", OBJECT).await.unwrap());
        assert!(!is_assignable(&vm, "Ljava/util/AbstractList;", "Ljava/util/RandomAccess;")
            .await
            .unwrap());

        // Arrays are covariant in reference components only
        assert!(is_assignable(&vm, "[Ljava/util/ArrayList;", "[Ljava/util/List;").await.unwrap());
        assert!(!is_assignable(&vm, "[I", "[J").await.unwrap());
        assert!(is_assignable(&vm, "[[I", "[Ljava/lang/Cloneable;").await.unwrap());
        assert!(!is_assignable(&vm, "Ljava/util/ArrayList;", "[Ljava/util/List;").await.unwrap());
    }
}
