use mlgraph::dsl::{parse_dsl, parse_dsl_with_implicit_output, DslError};
use mlgraph::dtype::{DType, TensorType};
use mlgraph::ops::OpKind;
use mlgraph::passes::{run_pipeline, standard_pipeline};

const RESNET_BLOCK: &str = "
model ResNetBlock {
  input x: Tensor<float32>[1, 64, 56, 56]

  conv1 = Conv2D(x, filters=64, kernel=3, padding=1)
  bn1 = BatchNorm(conv1)
  relu1 = ReLU(bn1)
  conv2 = Conv2D(relu1, filters=64, kernel=3, padding=1)
  bn2 = BatchNorm(conv2)
  residual = Add(bn2, x)
  out = ReLU(residual)

  output out
}";

#[test]
fn parse_resnet_block() {
    let graph = parse_dsl(RESNET_BLOCK).unwrap();
    assert_eq!(graph.metadata.name, "ResNetBlock");
    assert_eq!(graph.node_count(), 9);
    assert_eq!(graph.edge_count(), 9);
    assert!(graph.validate().is_ok());

    let x = graph.nodes().find(|n| n.name == "x").unwrap();
    assert_eq!(x.op, OpKind::Input);
    assert_eq!(
        x.output_type(),
        Some(&TensorType::new(DType::F32, vec![1, 64, 56, 56]))
    );

    let conv1 = graph.nodes().find(|n| n.name == "conv1").unwrap();
    assert_eq!(conv1.op, OpKind::Conv2D);
    assert_eq!(conv1.attrs.get("filters").and_then(|v| v.as_int()), Some(64));
    assert_eq!(conv1.attrs.get("padding").and_then(|v| v.as_int()), Some(1));

    // the residual add reads both the second batchnorm and the input
    let residual = graph.nodes().find(|n| n.name == "residual").unwrap();
    let producers = graph.producers(residual.id);
    assert_eq!(producers.len(), 2);
    assert!(producers.iter().any(|n| n.name == "bn2"));
    assert!(producers.iter().any(|n| n.name == "x"));
}

#[test]
fn comments_and_blank_lines_are_ignored() {
    let graph = parse_dsl(
        "model Tiny { // header comment
           // a lonely comment line
           input x: Tensor<float32>[4]

           y = ReLU(x) // trailing comment
           output y
         }",
    )
    .unwrap();
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
}

#[test]
fn typed_constants_and_list_attributes() {
    let graph = parse_dsl(
        "model Attention {
           input x: Tensor<float32>[1, 128, 512]
           wq = Constant(shape=[512, 512])
           q = MatMul(x, wq)
           qt = Transpose(q, perm=[0, 2, 1])
           output qt
         }",
    )
    .unwrap();

    let wq = graph.nodes().find(|n| n.name == "wq").unwrap();
    assert_eq!(wq.op, OpKind::Constant);
    assert_eq!(
        wq.output_type(),
        Some(&TensorType::new(DType::F32, vec![512, 512]))
    );

    let qt = graph.nodes().find(|n| n.name == "qt").unwrap();
    assert_eq!(qt.attrs.get("perm").and_then(|v| v.as_ints()), Some(&[0i64, 2, 1][..]));
}

#[test]
fn unknown_operator_is_an_error() {
    let result = parse_dsl(
        "model Bad {
           input x: Tensor<float32>[4]
           y = Frobnicate(x)
           output y
         }",
    );
    assert!(matches!(result, Err(DslError::UnknownOperator { line: 3, .. })));
}

#[test]
fn undefined_value_is_an_error() {
    let result = parse_dsl(
        "model Bad {
           input x: Tensor<float32>[4]
           y = ReLU(z)
           output y
         }",
    );
    assert!(matches!(
        result,
        Err(DslError::UndefinedValue { line: 3, ref name }) if name == "z"
    ));
}

#[test]
fn malformed_tensor_type_is_an_error() {
    let result = parse_dsl("model Bad {\n  input x: Matrix[4, 4]\n}");
    assert!(matches!(result, Err(DslError::InvalidTensorType { line: 2, .. })));

    let result = parse_dsl("model Bad {\n  input x: Tensor<float64>[4]\n}");
    assert!(matches!(result, Err(DslError::UnknownDType { line: 2, .. })));
}

#[test]
fn operand_count_is_checked() {
    let result = parse_dsl(
        "model Bad {
           input x: Tensor<float32>[4]
           y = Add(x)
           output y
         }",
    );
    assert!(matches!(
        result,
        Err(DslError::WrongArity {
            op: OpKind::Add,
            got: 1,
            ..
        })
    ));
}

#[test]
fn implicit_output_uses_last_assignment() {
    let graph = parse_dsl_with_implicit_output(
        "model Implicit {
           input x: Tensor<float32>[4]
           y = ReLU(x)
           z = Sigmoid(y)
         }",
    )
    .unwrap();

    let output = graph.nodes().find(|n| n.op == OpKind::Output).unwrap();
    assert_eq!(output.name, "output_z");
    let producers = graph.producers(output.id);
    assert_eq!(producers.len(), 1);
    assert_eq!(producers[0].name, "z");
}

#[test]
fn resnet_block_optimizes_end_to_end() {
    let graph = parse_dsl(RESNET_BLOCK).unwrap();
    let results = run_pipeline(&graph, &standard_pipeline()).unwrap();
    assert_eq!(results.len(), 5);

    let last = &results.last().unwrap().graph;
    assert_eq!(last.metadata.pass_history.len(), 5);

    // conv1+bn1+relu1 fuse fully, conv2+bn2 stop at the residual add
    let fused: Vec<_> = last.nodes().filter(|n| n.op == OpKind::FusedConvBNReLU).collect();
    assert_eq!(fused.len(), 2);
    assert_eq!(last.node_count(), 6);
    assert_eq!(last.edge_count(), 6);

    // planning ran over the fused snapshot
    let summary = last.metadata.memory_plan.unwrap();
    assert!(summary.peak_bytes > 0);
    assert!(summary.total_tensor_bytes >= summary.peak_bytes);

    // every remaining computational node carries an inferred type
    for node in last.nodes() {
        if node.op != OpKind::Output {
            assert!(node.output_type().is_some(), "{} has no type", node.id);
        }
    }
}
